// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! NACK_FRAG submessage codec (RTPS 2.3 Section 8.3.7.10).
//!
//! Requests retransmission of specific fragments of one sample, rather than
//! the whole sample.

use super::{
    put_sequence_number, put_submessage_header, read_entity_id, read_sequence_number, read_u32,
    split_submessage, submessage_id, FragmentNumberSet, RtpsCodecError, RtpsCodecResult,
    FLAG_ENDIANNESS,
};
use crate::core::types::{EntityId, SequenceNumber};

/// NACK_FRAG submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NackFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Sample whose fragments are requested.
    pub writer_sn: SequenceNumber,
    /// Missing fragment numbers.
    pub fragment_number_state: FragmentNumberSet,
    /// Monotonically increasing per (reader, writer) pair.
    pub count: u32,
}

impl NackFragSubmessage {
    /// Encode including the 4-byte submessage header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body_len = 8 + 8 + 8 + self.fragment_number_state.word_count() * 4 + 4;
        let mut buf = Vec::with_capacity(4 + body_len);
        put_submessage_header(&mut buf, submessage_id::NACK_FRAG, FLAG_ENDIANNESS, body_len);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        put_sequence_number(&mut buf, self.writer_sn);
        self.fragment_number_state.encode_into(&mut buf);
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, _flags, body) = split_submessage(buf)?;
        if id != submessage_id::NACK_FRAG {
            return Err(RtpsCodecError::InvalidParameter(
                "not a NACK_FRAG submessage",
            ));
        }

        let reader_id = read_entity_id(body, 0)?;
        let writer_id = read_entity_id(body, 4)?;
        let writer_sn = read_sequence_number(body, 8)?;
        if writer_sn < 1 {
            return Err(RtpsCodecError::InvalidParameter("non-positive writerSN"));
        }
        let (fragment_number_state, set_len) = FragmentNumberSet::decode_from(&body[16..])?;
        let count = read_u32(body, 16 + set_len)?;

        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            fragment_number_state,
            count,
        })
    }
}
