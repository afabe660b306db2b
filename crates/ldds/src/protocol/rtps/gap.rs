// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! GAP submessage codec (RTPS 2.3 Section 8.3.7.4).
//!
//! Tells a reader that a range/set of sequence numbers is irrelevant for it
//! (filtered out or no longer available), so the reader can advance without
//! waiting for data that will never arrive.

use super::{
    put_sequence_number, put_submessage_header, read_entity_id, read_sequence_number,
    split_submessage, submessage_id, RtpsCodecError, RtpsCodecResult, SequenceNumberSet,
    FLAG_ENDIANNESS,
};
use crate::core::types::{EntityId, SequenceNumber};

/// GAP submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    /// First irrelevant sequence number.
    pub gap_start: SequenceNumber,
    /// `gap_list.base()` ends the contiguous run `[gap_start, base)`; set
    /// bits name further irrelevant sequence numbers.
    pub gap_list: SequenceNumberSet,
}

impl GapSubmessage {
    /// GAP covering the contiguous range `[start, end)`.
    pub fn contiguous(
        reader_id: EntityId,
        writer_id: EntityId,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Option<Self> {
        if start < 1 || end <= start {
            return None;
        }
        Some(Self {
            reader_id,
            writer_id,
            gap_start: start,
            gap_list: SequenceNumberSet::empty(end),
        })
    }

    /// All sequence numbers named irrelevant by this GAP, ascending.
    #[must_use]
    pub fn irrelevant_sequences(&self) -> Vec<SequenceNumber> {
        let mut seqs: Vec<SequenceNumber> = (self.gap_start..self.gap_list.base()).collect();
        seqs.extend(self.gap_list.iter());
        seqs
    }

    /// Encode including the 4-byte submessage header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body_len = 8 + 8 + 12 + self.gap_list.word_count() * 4;
        let mut buf = Vec::with_capacity(4 + body_len);
        put_submessage_header(&mut buf, submessage_id::GAP, FLAG_ENDIANNESS, body_len);
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        put_sequence_number(&mut buf, self.gap_start);
        self.gap_list.encode_into(&mut buf);
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, _flags, body) = split_submessage(buf)?;
        if id != submessage_id::GAP {
            return Err(RtpsCodecError::InvalidParameter("not a GAP submessage"));
        }

        let reader_id = read_entity_id(body, 0)?;
        let writer_id = read_entity_id(body, 4)?;
        let gap_start = read_sequence_number(body, 8)?;
        if gap_start < 1 {
            return Err(RtpsCodecError::InvalidParameter("non-positive gapStart"));
        }
        let (gap_list, _) = SequenceNumberSet::decode_from(&body[16..])?;
        if gap_list.base() < gap_start {
            return Err(RtpsCodecError::InvalidParameter(
                "gapList base precedes gapStart",
            ));
        }

        Ok(Self {
            reader_id,
            writer_id,
            gap_start,
            gap_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gap_contiguous_roundtrip() {
        let msg = GapSubmessage::contiguous([0; 4], [0, 0, 0, 0xC2], 4, 8)
            .expect("non-empty range");

        assert_eq!(msg.irrelevant_sequences(), vec![4, 5, 6, 7]);

        let bytes = msg.encode();
        assert_eq!(bytes[0], 0x08);
        let decoded = GapSubmessage::decode(&bytes).expect("well-formed GAP");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_gap_with_sparse_tail() {
        let gap_list = SequenceNumberSet::from_sequences(10, &[12, 15]).expect("within window");
        let msg = GapSubmessage {
            reader_id: [0; 4],
            writer_id: [0, 0, 0, 0xC2],
            gap_start: 8,
            gap_list,
        };

        assert_eq!(msg.irrelevant_sequences(), vec![8, 9, 12, 15]);
        let decoded = GapSubmessage::decode(&msg.encode()).expect("well-formed GAP");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_gap_rejects_degenerate_ranges() {
        assert!(GapSubmessage::contiguous([0; 4], [0; 4], 5, 5).is_none());
        assert!(GapSubmessage::contiguous([0; 4], [0; 4], 0, 3).is_none());

        let msg = GapSubmessage::contiguous([0; 4], [0; 4], 4, 8).expect("non-empty range");
        let mut bytes = msg.encode();
        // gapStart := 20, now past the gapList base of 8
        bytes[12..16].copy_from_slice(&0i32.to_le_bytes());
        bytes[16..20].copy_from_slice(&20u32.to_le_bytes());
        assert!(GapSubmessage::decode(&bytes).is_err());
    }
}
