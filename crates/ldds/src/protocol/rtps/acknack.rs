// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! ACKNACK submessage codec (RTPS 2.3 Section 8.3.7.1).
//!
//! Sent by a reader: the bitmap base acknowledges everything below it, set
//! bits request retransmission. The Final flag signals the reader considers
//! itself synchronized.

use super::{
    put_submessage_header, read_entity_id, read_u32, split_submessage, submessage_id,
    RtpsCodecError, RtpsCodecResult, SequenceNumberSet, FLAG_ENDIANNESS, FLAG_FINAL,
};
use crate::core::types::EntityId;

/// ACKNACK submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckNackSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// Base acknowledges `.. base-1`; set bits are retransmission requests.
    pub reader_sn_state: SequenceNumberSet,
    /// Monotonically increasing per (reader, writer) pair; guards replays.
    pub count: u32,
    /// Final flag: the reader is synchronized, writer may stop heartbeating.
    pub final_flag: bool,
}

impl AckNackSubmessage {
    /// Pure positive acknowledgment of everything below `base`.
    #[must_use]
    pub fn ack_up_to(
        reader_id: EntityId,
        writer_id: EntityId,
        base: crate::core::types::SequenceNumber,
        count: u32,
    ) -> Self {
        Self {
            reader_id,
            writer_id,
            reader_sn_state: SequenceNumberSet::empty(base),
            count,
            final_flag: true,
        }
    }

    /// Encode including the 4-byte submessage header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut flags = FLAG_ENDIANNESS;
        if self.final_flag {
            flags |= FLAG_FINAL;
        }

        let body_len = 8 + 12 + self.reader_sn_state.word_count() * 4 + 4;
        let mut buf = Vec::with_capacity(4 + body_len);
        put_submessage_header(&mut buf, submessage_id::ACKNACK, flags, body_len);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        self.reader_sn_state.encode_into(&mut buf);
        buf.extend_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, flags, body) = split_submessage(buf)?;
        if id != submessage_id::ACKNACK {
            return Err(RtpsCodecError::InvalidParameter("not an ACKNACK submessage"));
        }

        let reader_id = read_entity_id(body, 0)?;
        let writer_id = read_entity_id(body, 4)?;
        let (reader_sn_state, set_len) = SequenceNumberSet::decode_from(&body[8..])?;
        let count = read_u32(body, 8 + set_len)?;

        Ok(Self {
            reader_id,
            writer_id,
            reader_sn_state,
            count,
            final_flag: flags & FLAG_FINAL != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknack_positive_ack_roundtrip() {
        let msg = AckNackSubmessage::ack_up_to([0, 0, 4, 0xC7], [0, 0, 3, 0xC2], 6, 1);

        let bytes = msg.encode();
        assert_eq!(bytes[0], 0x06);
        assert_eq!(bytes[1], FLAG_ENDIANNESS | FLAG_FINAL);

        let decoded = AckNackSubmessage::decode(&bytes).expect("well-formed ACKNACK");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
        assert!(decoded.reader_sn_state.is_empty());
        assert_eq!(decoded.reader_sn_state.base(), 6);
    }

    #[test]
    fn test_acknack_nack_roundtrip() {
        let state = SequenceNumberSet::from_sequences(3, &[3, 5]).expect("within window");
        let msg = AckNackSubmessage {
            reader_id: [0, 0, 4, 0xC7],
            writer_id: [0, 0, 3, 0xC2],
            reader_sn_state: state,
            count: 12,
            final_flag: false,
        };

        let decoded = AckNackSubmessage::decode(&msg.encode()).expect("well-formed ACKNACK");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.reader_sn_state.iter().collect::<Vec<_>>(), vec![3, 5]);
    }

    #[test]
    fn test_acknack_truncated_count_rejected() {
        let msg = AckNackSubmessage::ack_up_to([0; 4], [0; 4], 1, 1);
        let bytes = msg.encode();
        assert!(AckNackSubmessage::decode(&bytes[..bytes.len() - 4]).is_err());
    }
}
