// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! DATA and DATA_FRAG submessage codecs (RTPS 2.3 Section 8.3.7.2-3).
//!
//! DATA carries one serialized sample. DATA_FRAG carries a run of fragments
//! of a large sample. Inline QoS travels as an opaque RTPS parameter list
//! terminated by the sentinel pid; this module only delimits it, it does not
//! interpret the parameters.

use super::{
    put_sequence_number, put_submessage_header, read_entity_id, read_sequence_number, read_u16,
    read_u32, split_submessage, submessage_id, RtpsCodecError, RtpsCodecResult, FLAG_DATA_PRESENT,
    FLAG_ENDIANNESS, FLAG_INLINE_QOS,
};
use crate::core::types::{EntityId, FragmentNumber, SequenceNumber};

/// PID_SENTINEL: terminates an inline-QoS parameter list.
const PID_SENTINEL: u16 = 0x0001;

/// Minimal parameter list carrying no parameters (sentinel only).
pub(crate) const EMPTY_INLINE_QOS: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

/// Walk a parameter list and return its total length including the sentinel.
fn parameter_list_len(buf: &[u8]) -> RtpsCodecResult<usize> {
    let mut offset = 0usize;
    loop {
        let pid = read_u16(buf, offset)?;
        let len = usize::from(read_u16(buf, offset + 2)?);
        offset += 4;
        if pid == PID_SENTINEL {
            return Ok(offset);
        }
        if !len.is_multiple_of(4) {
            return Err(RtpsCodecError::InvalidParameter(
                "inline-QoS parameter length not 4-byte aligned",
            ));
        }
        offset += len;
        if offset > buf.len() {
            return Err(RtpsCodecError::Truncated);
        }
    }
}

// ============================================================================
// DATA
// ============================================================================

/// DATA submessage: one serialized sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    /// Opaque parameter list, sentinel-terminated.
    pub inline_qos: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl DataSubmessage {
    /// Encode including the 4-byte submessage header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let qos_len = self.inline_qos.as_ref().map_or(0, Vec::len);
        let body_len = 4 + 4 + 4 + 8 + qos_len + self.payload.len();

        let mut flags = FLAG_ENDIANNESS;
        if self.inline_qos.is_some() {
            flags |= FLAG_INLINE_QOS;
        }
        if !self.payload.is_empty() {
            flags |= FLAG_DATA_PRESENT;
        }

        let mut buf = Vec::with_capacity(4 + body_len);
        put_submessage_header(&mut buf, submessage_id::DATA, flags, body_len);
        buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
        buf.extend_from_slice(&16u16.to_le_bytes()); // octetsToInlineQos
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        put_sequence_number(&mut buf, self.writer_sn);
        if let Some(qos) = &self.inline_qos {
            buf.extend_from_slice(qos);
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, flags, body) = split_submessage(buf)?;
        if id != submessage_id::DATA {
            return Err(RtpsCodecError::InvalidParameter("not a DATA submessage"));
        }

        let reader_id = read_entity_id(body, 4)?;
        let writer_id = read_entity_id(body, 8)?;
        let writer_sn = read_sequence_number(body, 12)?;
        if writer_sn < 1 {
            return Err(RtpsCodecError::InvalidParameter("non-positive writerSN"));
        }

        let mut offset = 20;
        let inline_qos = if flags & FLAG_INLINE_QOS != 0 {
            let len = parameter_list_len(&body[offset..])?;
            let qos = body[offset..offset + len].to_vec();
            offset += len;
            Some(qos)
        } else {
            None
        };

        let payload = if flags & FLAG_DATA_PRESENT != 0 {
            body[offset..].to_vec()
        } else {
            Vec::new()
        };

        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            inline_qos,
            payload,
        })
    }
}

// ============================================================================
// DATA_FRAG
// ============================================================================

/// DATA_FRAG submessage: a run of fragments of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFragSubmessage {
    pub reader_id: EntityId,
    pub writer_id: EntityId,
    pub writer_sn: SequenceNumber,
    /// 1-based number of the first fragment in this submessage.
    pub fragment_starting_num: FragmentNumber,
    /// How many consecutive fragments this submessage carries.
    pub fragments_in_submessage: u16,
    /// Nominal fragment size (bytes); the sample's last fragment may be short.
    pub fragment_size: u16,
    /// Total size of the complete serialized sample.
    pub sample_size: u32,
    pub inline_qos: Option<Vec<u8>>,
    pub payload: Vec<u8>,
}

impl DataFragSubmessage {
    /// Encode including the 4-byte submessage header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let qos_len = self.inline_qos.as_ref().map_or(0, Vec::len);
        let body_len = 4 + 4 + 4 + 8 + 4 + 2 + 2 + 4 + qos_len + self.payload.len();

        let mut flags = FLAG_ENDIANNESS;
        if self.inline_qos.is_some() {
            flags |= FLAG_INLINE_QOS;
        }

        let mut buf = Vec::with_capacity(4 + body_len);
        put_submessage_header(&mut buf, submessage_id::DATA_FRAG, flags, body_len);
        buf.extend_from_slice(&0u16.to_le_bytes()); // extraFlags
        buf.extend_from_slice(&28u16.to_le_bytes()); // octetsToInlineQos
        buf.extend_from_slice(&self.reader_id);
        buf.extend_from_slice(&self.writer_id);
        put_sequence_number(&mut buf, self.writer_sn);
        buf.extend_from_slice(&self.fragment_starting_num.to_le_bytes());
        buf.extend_from_slice(&self.fragments_in_submessage.to_le_bytes());
        buf.extend_from_slice(&self.fragment_size.to_le_bytes());
        buf.extend_from_slice(&self.sample_size.to_le_bytes());
        if let Some(qos) = &self.inline_qos {
            buf.extend_from_slice(qos);
        }
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, flags, body) = split_submessage(buf)?;
        if id != submessage_id::DATA_FRAG {
            return Err(RtpsCodecError::InvalidParameter(
                "not a DATA_FRAG submessage",
            ));
        }

        let reader_id = read_entity_id(body, 4)?;
        let writer_id = read_entity_id(body, 8)?;
        let writer_sn = read_sequence_number(body, 12)?;
        let fragment_starting_num = read_u32(body, 20)?;
        let fragments_in_submessage = read_u16(body, 24)?;
        let fragment_size = read_u16(body, 26)?;
        let sample_size = read_u32(body, 28)?;

        if fragment_starting_num == 0 {
            return Err(RtpsCodecError::InvalidParameter(
                "fragment numbers are 1-based",
            ));
        }
        if fragment_size == 0 {
            return Err(RtpsCodecError::InvalidParameter("zero fragment size"));
        }

        let mut offset = 32;
        let inline_qos = if flags & FLAG_INLINE_QOS != 0 {
            let len = parameter_list_len(&body[offset..])?;
            let qos = body[offset..offset + len].to_vec();
            offset += len;
            Some(qos)
        } else {
            None
        };

        Ok(Self {
            reader_id,
            writer_id,
            writer_sn,
            fragment_starting_num,
            fragments_in_submessage,
            fragment_size,
            sample_size,
            inline_qos,
            payload: body[offset..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ENTITYID_UNKNOWN;

    #[test]
    fn test_data_roundtrip_plain() {
        let msg = DataSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: [0x00, 0x01, 0x02, 0x02],
            writer_sn: 7,
            inline_qos: None,
            payload: b"Hello, DDS!".to_vec(),
        };

        let bytes = msg.encode();
        assert_eq!(bytes[0], 0x15);
        assert_eq!(bytes[1], FLAG_ENDIANNESS | FLAG_DATA_PRESENT);

        let decoded = DataSubmessage::decode(&bytes).expect("well-formed DATA");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_data_roundtrip_with_inline_qos() {
        let msg = DataSubmessage {
            reader_id: [0, 0, 0, 0x07],
            writer_id: [0x00, 0x01, 0x02, 0x02],
            writer_sn: 99,
            inline_qos: Some(EMPTY_INLINE_QOS.to_vec()),
            payload: vec![1, 2, 3, 4],
        };

        let bytes = msg.encode();
        assert_eq!(
            bytes[1],
            FLAG_ENDIANNESS | FLAG_INLINE_QOS | FLAG_DATA_PRESENT
        );

        let decoded = DataSubmessage::decode(&bytes).expect("well-formed DATA");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_data_with_parameterized_inline_qos() {
        // One 8-byte parameter (pid 0x0070) followed by the sentinel
        let mut qos = vec![0x70, 0x00, 0x08, 0x00];
        qos.extend_from_slice(&[0xAA; 8]);
        qos.extend_from_slice(&EMPTY_INLINE_QOS);

        let msg = DataSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: [0x00, 0x01, 0x02, 0x02],
            writer_sn: 1,
            inline_qos: Some(qos),
            payload: b"x".to_vec(),
        };

        let decoded = DataSubmessage::decode(&msg.encode()).expect("well-formed DATA");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_data_rejects_invalid_sn() {
        let msg = DataSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: ENTITYID_UNKNOWN,
            writer_sn: 5,
            inline_qos: None,
            payload: Vec::new(),
        };
        let mut bytes = msg.encode();
        // Overwrite the SN with 0
        bytes[16..24].copy_from_slice(&[0u8; 8]);
        assert!(DataSubmessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_data_frag_roundtrip() {
        let msg = DataFragSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: [0x00, 0x01, 0x02, 0x02],
            writer_sn: 1,
            fragment_starting_num: 4,
            fragments_in_submessage: 1,
            fragment_size: 1024,
            sample_size: 10_240,
            inline_qos: None,
            payload: vec![0xCD; 1024],
        };

        let bytes = msg.encode();
        assert_eq!(bytes[0], 0x16);

        let decoded = DataFragSubmessage::decode(&bytes).expect("well-formed DATA_FRAG");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encode(), bytes);
    }

    #[test]
    fn test_data_frag_rejects_zero_fragment_number() {
        let msg = DataFragSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: ENTITYID_UNKNOWN,
            writer_sn: 1,
            fragment_starting_num: 1,
            fragments_in_submessage: 1,
            fragment_size: 16,
            sample_size: 64,
            inline_qos: None,
            payload: vec![0; 16],
        };
        let mut bytes = msg.encode();
        bytes[24..28].copy_from_slice(&0u32.to_le_bytes());
        assert!(DataFragSubmessage::decode(&bytes).is_err());
    }

    #[test]
    fn test_truncated_input() {
        let msg = DataSubmessage {
            reader_id: ENTITYID_UNKNOWN,
            writer_id: ENTITYID_UNKNOWN,
            writer_sn: 1,
            inline_qos: None,
            payload: b"abcdef".to_vec(),
        };
        let bytes = msg.encode();
        assert!(DataSubmessage::decode(&bytes[..10]).is_err());
    }
}
