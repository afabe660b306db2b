// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! ParticipantMessageData payload (RTPS 2.3 Section 9.6.2.1).
//!
//! The Writer Liveliness Protocol travels on a built-in topic whose samples
//! identify the asserting participant and the liveliness category. Payload
//! layout: 12-byte participant prefix, 4-byte kind octets, then a
//! length-prefixed opaque data blob padded to 4 bytes.

use crate::core::types::{GuidPrefix, GUID_PREFIX_LEN};
use crate::qos::LivelinessKind;

/// Kind octets: automatic liveliness assertion.
pub const PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC: [u8; 4] = [0x00, 0x00, 0x00, 0x01];
/// Kind octets: manual-by-participant liveliness assertion.
pub const PARTICIPANT_MESSAGE_DATA_KIND_MANUAL_BY_PARTICIPANT: [u8; 4] = [0x00, 0x00, 0x00, 0x02];

/// One WLP assertion sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantMessageData {
    pub guid_prefix: GuidPrefix,
    pub kind: [u8; 4],
    pub data: Vec<u8>,
}

impl ParticipantMessageData {
    /// Assertion sample for the given participant and liveliness category.
    ///
    /// `None` for manual-by-topic: that category never travels on the
    /// participant-message topic.
    #[must_use]
    pub fn assertion(prefix: GuidPrefix, kind: LivelinessKind) -> Option<Self> {
        let kind = wire_kind(kind)?;
        Some(Self {
            guid_prefix: prefix,
            kind,
            data: Vec::new(),
        })
    }

    /// Liveliness category named by the kind octets.
    #[must_use]
    pub fn liveliness_kind(&self) -> Option<LivelinessKind> {
        match self.kind {
            PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC => Some(LivelinessKind::Automatic),
            PARTICIPANT_MESSAGE_DATA_KIND_MANUAL_BY_PARTICIPANT => {
                Some(LivelinessKind::ManualByParticipant)
            }
            _ => None,
        }
    }

    /// Serialize: prefix + kind + u32 length + data (padded to 4).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let padded = self.data.len().div_ceil(4) * 4;
        let mut buf = Vec::with_capacity(GUID_PREFIX_LEN + 4 + 4 + padded);
        buf.extend_from_slice(&self.guid_prefix);
        buf.extend_from_slice(&self.kind);
        buf.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.data);
        buf.resize(GUID_PREFIX_LEN + 4 + 4 + padded, 0);
        buf
    }

    /// Parse a serialized sample.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < GUID_PREFIX_LEN + 8 {
            return None;
        }
        let mut guid_prefix = [0u8; GUID_PREFIX_LEN];
        guid_prefix.copy_from_slice(&buf[..GUID_PREFIX_LEN]);

        let mut kind = [0u8; 4];
        kind.copy_from_slice(&buf[GUID_PREFIX_LEN..GUID_PREFIX_LEN + 4]);

        let len = u32::from_le_bytes(
            buf[GUID_PREFIX_LEN + 4..GUID_PREFIX_LEN + 8]
                .try_into()
                .ok()?,
        ) as usize;
        let data_start = GUID_PREFIX_LEN + 8;
        if buf.len() < data_start + len {
            return None;
        }

        Some(Self {
            guid_prefix,
            kind,
            data: buf[data_start..data_start + len].to_vec(),
        })
    }

    /// Instance key for the built-in topic: one instance per
    /// (participant, kind) pair.
    #[must_use]
    pub fn instance_key(&self) -> u64 {
        let mut key = 0xcbf2_9ce4_8422_2325u64; // FNV-1a offset basis
        for b in self.guid_prefix.iter().chain(self.kind.iter()) {
            key ^= u64::from(*b);
            key = key.wrapping_mul(0x0000_0100_0000_01B3);
        }
        key
    }
}

fn wire_kind(kind: LivelinessKind) -> Option<[u8; 4]> {
    match kind {
        LivelinessKind::Automatic => Some(PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC),
        LivelinessKind::ManualByParticipant => {
            Some(PARTICIPANT_MESSAGE_DATA_KIND_MANUAL_BY_PARTICIPANT)
        }
        LivelinessKind::ManualByTopic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let sample = ParticipantMessageData {
            guid_prefix: [7; 12],
            kind: PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC,
            data: vec![1, 2, 3],
        };
        let bytes = sample.encode();
        // 12 + 4 + 4 + padded(3 -> 4)
        assert_eq!(bytes.len(), 24);

        let decoded = ParticipantMessageData::decode(&bytes).expect("well-formed sample");
        assert_eq!(decoded, sample);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_assertion_kinds() {
        let auto = ParticipantMessageData::assertion([1; 12], LivelinessKind::Automatic)
            .expect("automatic has a wire kind");
        assert_eq!(auto.liveliness_kind(), Some(LivelinessKind::Automatic));

        let manual =
            ParticipantMessageData::assertion([1; 12], LivelinessKind::ManualByParticipant)
                .expect("manual-by-participant has a wire kind");
        assert_eq!(
            manual.liveliness_kind(),
            Some(LivelinessKind::ManualByParticipant)
        );

        assert!(ParticipantMessageData::assertion([1; 12], LivelinessKind::ManualByTopic).is_none());
    }

    #[test]
    fn test_unknown_kind_octets() {
        let sample = ParticipantMessageData {
            guid_prefix: [0; 12],
            kind: [0xDE, 0xAD, 0xBE, 0xEF],
            data: Vec::new(),
        };
        assert_eq!(sample.liveliness_kind(), None);
    }

    #[test]
    fn test_instance_key_distinguishes_kind_and_prefix() {
        let a = ParticipantMessageData::assertion([1; 12], LivelinessKind::Automatic)
            .expect("wire kind");
        let b = ParticipantMessageData::assertion([1; 12], LivelinessKind::ManualByParticipant)
            .expect("wire kind");
        let c = ParticipantMessageData::assertion([2; 12], LivelinessKind::Automatic)
            .expect("wire kind");
        assert_ne!(a.instance_key(), b.instance_key());
        assert_ne!(a.instance_key(), c.instance_key());
    }

    #[test]
    fn test_decode_rejects_truncated() {
        let sample = ParticipantMessageData {
            guid_prefix: [7; 12],
            kind: PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC,
            data: vec![9; 8],
        };
        let bytes = sample.encode();
        assert!(ParticipantMessageData::decode(&bytes[..10]).is_none());
        assert!(ParticipantMessageData::decode(&bytes[..bytes.len() - 6]).is_none());
    }
}
