// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! # RTPS Submessage Codecs (OMG RTPS 2.3 Specification)
//!
//! Vendor-neutral encoding and decoding of the submessages the publication
//! pipeline emits and consumes. Every submessage type round-trips
//! byte-exactly: `encode(decode(bytes)) == bytes` for well-formed input.
//!
//! # Submessages
//!
//! - ACKNACK (0x06): Positive/negative acknowledgment
//! - HEARTBEAT (0x07): Writer liveliness and available sequences
//! - GAP (0x08): Irrelevant sequence numbers
//! - INFO_TS (0x09): Timestamp for subsequent submessages
//! - INFO_DST (0x0E): Destination GUID prefix
//! - NACK_FRAG (0x12): Fragment-level retransmission request
//! - DATA (0x15): User data payload
//! - DATA_FRAG (0x16): Fragmented user data
//!
//! All encoders emit little-endian submessages (endianness flag set).
//!
//! # References
//!
//! - OMG RTPS 2.3 spec: Section 8.3.7 (Submessages)
//! - OMG RTPS 2.3 spec: Section 9.4.5 (SequenceNumberSet)

mod acknack;
mod data;
mod gap;
mod heartbeat;
mod info;
mod message;
mod nackfrag;
mod set;

pub use acknack::AckNackSubmessage;
pub use data::{DataFragSubmessage, DataSubmessage};
pub use gap::GapSubmessage;
pub use heartbeat::HeartbeatSubmessage;
pub use info::{InfoDestinationSubmessage, InfoTimestampSubmessage};
pub use message::{parse_message, Submessage, RTPS_HEADER_LEN, RTPS_PROTOCOL_VERSION, VENDOR_ID};
pub(crate) use data::EMPTY_INLINE_QOS;
pub(crate) use message::put_message_header;
pub use nackfrag::NackFragSubmessage;
pub use set::{FragmentNumberSet, SequenceNumberSet, MAX_BITMAP_BITS};

/// Submessage identifiers (RTPS 2.3 Table 8.13).
pub mod submessage_id {
    pub const ACKNACK: u8 = 0x06;
    pub const HEARTBEAT: u8 = 0x07;
    pub const GAP: u8 = 0x08;
    pub const INFO_TS: u8 = 0x09;
    pub const INFO_DST: u8 = 0x0E;
    pub const NACK_FRAG: u8 = 0x12;
    pub const DATA: u8 = 0x15;
    pub const DATA_FRAG: u8 = 0x16;
}

/// Endianness flag, set on every submessage this engine emits.
pub const FLAG_ENDIANNESS: u8 = 0x01;
/// Final flag (HEARTBEAT, ACKNACK): no response required/expected.
pub const FLAG_FINAL: u8 = 0x02;
/// Inline-QoS flag (DATA, DATA_FRAG).
pub const FLAG_INLINE_QOS: u8 = 0x02;
/// Data-present flag (DATA).
pub const FLAG_DATA_PRESENT: u8 = 0x04;

/// Result type for RTPS codec operations.
pub type RtpsCodecResult<T> = Result<T, RtpsCodecError>;

/// Errors that can occur while encoding or decoding submessages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpsCodecError {
    /// Input ended before the submessage was complete.
    Truncated,
    /// A field violates the specification.
    InvalidParameter(&'static str),
}

impl std::fmt::Display for RtpsCodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated RTPS submessage"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {}", msg),
        }
    }
}

impl std::error::Error for RtpsCodecError {}

/// Write a submessage header (id, flags, octetsToNextHeader).
pub(crate) fn put_submessage_header(buf: &mut Vec<u8>, id: u8, flags: u8, length: usize) {
    buf.push(id);
    buf.push(flags);
    buf.extend_from_slice(&(length as u16).to_le_bytes());
}

/// Parse a submessage header, returning (id, flags, body).
pub(crate) fn split_submessage(buf: &[u8]) -> RtpsCodecResult<(u8, u8, &[u8])> {
    if buf.len() < 4 {
        return Err(RtpsCodecError::Truncated);
    }
    let length = usize::from(u16::from_le_bytes([buf[2], buf[3]]));
    if buf.len() < 4 + length {
        return Err(RtpsCodecError::Truncated);
    }
    Ok((buf[0], buf[1], &buf[4..4 + length]))
}

pub(crate) fn read_u16(buf: &[u8], offset: usize) -> RtpsCodecResult<u16> {
    let bytes: [u8; 2] = buf
        .get(offset..offset + 2)
        .and_then(|s| s.try_into().ok())
        .ok_or(RtpsCodecError::Truncated)?;
    Ok(u16::from_le_bytes(bytes))
}

pub(crate) fn read_u32(buf: &[u8], offset: usize) -> RtpsCodecResult<u32> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(RtpsCodecError::Truncated)?;
    Ok(u32::from_le_bytes(bytes))
}

pub(crate) fn read_i32(buf: &[u8], offset: usize) -> RtpsCodecResult<i32> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(RtpsCodecError::Truncated)?;
    Ok(i32::from_le_bytes(bytes))
}

pub(crate) fn read_entity_id(buf: &[u8], offset: usize) -> RtpsCodecResult<[u8; 4]> {
    buf.get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(RtpsCodecError::Truncated)
}

/// Read a wire sequence number (high i32 + low u32).
pub(crate) fn read_sequence_number(
    buf: &[u8],
    offset: usize,
) -> RtpsCodecResult<crate::core::types::SequenceNumber> {
    let high = read_i32(buf, offset)?;
    let low = read_u32(buf, offset + 4)?;
    Ok(crate::core::types::sequence_number_from_wire(high, low))
}

/// Append a wire sequence number (high i32 + low u32).
pub(crate) fn put_sequence_number(buf: &mut Vec<u8>, sn: crate::core::types::SequenceNumber) {
    let (high, low) = crate::core::types::sequence_number_to_wire(sn);
    buf.extend_from_slice(&high.to_le_bytes());
    buf.extend_from_slice(&low.to_le_bytes());
}
