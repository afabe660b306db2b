// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! HEARTBEAT submessage codec (RTPS 2.3 Section 8.3.7.5).
//!
//! Sent by a writer to announce the range of sequence numbers it still
//! holds. The Final flag tells readers no response is required; without it
//! the reader must answer with an ACKNACK.

use super::{
    put_sequence_number, put_submessage_header, read_entity_id, read_sequence_number, read_u32,
    split_submessage, submessage_id, RtpsCodecError, RtpsCodecResult, FLAG_ENDIANNESS, FLAG_FINAL,
};
use crate::core::types::{EntityId, SequenceNumber};

/// HEARTBEAT submessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Oldest sequence number still available from the writer.
    pub first_sn: SequenceNumber,
    /// Newest sequence number written.
    pub last_sn: SequenceNumber,
    /// Monotonically increasing per (writer, reader) pair.
    pub count: u32,
    /// Final flag: reader need not respond.
    pub final_flag: bool,
}

impl HeartbeatSubmessage {
    /// Encode including the 4-byte submessage header (32 bytes total).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = FLAG_ENDIANNESS;
        if self.final_flag {
            flags |= FLAG_FINAL;
        }

        let mut buf = Vec::with_capacity(32);
        put_submessage_header(&mut buf, submessage_id::HEARTBEAT, flags, 28);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        put_sequence_number(&mut buf, self.first_sn);
        put_sequence_number(&mut buf, self.last_sn);
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, flags, body) = split_submessage(buf)?;
        if id != submessage_id::HEARTBEAT {
            return Err(RtpsCodecError::InvalidParameter(
                "not a HEARTBEAT submessage",
            ));
        }

        let first_sn = read_sequence_number(body, 8)?;
        let last_sn = read_sequence_number(body, 16)?;
        // An empty writer announces first = last + 1; anything below that is
        // malformed.
        if first_sn < 1 || last_sn < first_sn - 1 {
            return Err(RtpsCodecError::InvalidParameter(
                "inconsistent heartbeat sequence range",
            ));
        }

        Ok(Self {
            reader_id: read_entity_id(body, 0)?,
            writer_id: read_entity_id(body, 4)?,
            first_sn,
            last_sn,
            count: read_u32(body, 24)?,
            final_flag: flags & FLAG_FINAL != 0,
        })
    }
}
