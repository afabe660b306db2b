// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! RTPS message framing: header + submessage walk.
//!
//! A message is a 20-byte header (`RTPS` magic, protocol version, vendor id,
//! sender GUID prefix) followed by submessages. The parser is tolerant of
//! submessage kinds it does not know; they surface as [`Submessage::Unknown`]
//! so future protocol extensions pass through cleanly.

use super::{
    split_submessage, submessage_id, AckNackSubmessage, DataFragSubmessage, DataSubmessage,
    GapSubmessage, HeartbeatSubmessage, InfoDestinationSubmessage, InfoTimestampSubmessage,
    NackFragSubmessage, RtpsCodecError, RtpsCodecResult,
};
use crate::core::types::{GuidPrefix, GUID_PREFIX_LEN};

/// RTPS message header length.
pub const RTPS_HEADER_LEN: usize = 20;

/// Protocol version this engine speaks.
pub const RTPS_PROTOCOL_VERSION: [u8; 2] = [2, 3];

/// Vendor id carried in outgoing message headers.
pub const VENDOR_ID: [u8; 2] = [0x01, 0x5C];

/// Append an RTPS message header for the given sender.
pub(crate) fn put_message_header(buf: &mut Vec<u8>, sender_prefix: &GuidPrefix) {
    buf.extend_from_slice(b"RTPS");
    buf.extend_from_slice(&RTPS_PROTOCOL_VERSION);
    buf.extend_from_slice(&VENDOR_ID);
    buf.extend_from_slice(sender_prefix);
}

/// One parsed submessage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submessage {
    Data(DataSubmessage),
    DataFrag(DataFragSubmessage),
    Heartbeat(HeartbeatSubmessage),
    AckNack(AckNackSubmessage),
    NackFrag(NackFragSubmessage),
    Gap(GapSubmessage),
    InfoTimestamp(InfoTimestampSubmessage),
    InfoDestination(InfoDestinationSubmessage),
    /// Submessage kind this engine does not interpret.
    Unknown { id: u8 },
}

/// Parse a whole RTPS message into the sender prefix and its submessages.
pub fn parse_message(buf: &[u8]) -> RtpsCodecResult<(GuidPrefix, Vec<Submessage>)> {
    if buf.len() < RTPS_HEADER_LEN {
        return Err(RtpsCodecError::Truncated);
    }
    if &buf[0..4] != b"RTPS" {
        return Err(RtpsCodecError::InvalidParameter("missing RTPS magic"));
    }

    let mut sender_prefix: GuidPrefix = [0; GUID_PREFIX_LEN];
    sender_prefix.copy_from_slice(&buf[8..RTPS_HEADER_LEN]);

    let mut submessages = Vec::new();
    let mut offset = RTPS_HEADER_LEN;
    while offset < buf.len() {
        let (id, _flags, body) = split_submessage(&buf[offset..])?;
        let raw = &buf[offset..offset + 4 + body.len()];

        let parsed = match id {
            submessage_id::DATA => Submessage::Data(DataSubmessage::decode(raw)?),
            submessage_id::DATA_FRAG => Submessage::DataFrag(DataFragSubmessage::decode(raw)?),
            submessage_id::HEARTBEAT => Submessage::Heartbeat(HeartbeatSubmessage::decode(raw)?),
            submessage_id::ACKNACK => Submessage::AckNack(AckNackSubmessage::decode(raw)?),
            submessage_id::NACK_FRAG => Submessage::NackFrag(NackFragSubmessage::decode(raw)?),
            submessage_id::GAP => Submessage::Gap(GapSubmessage::decode(raw)?),
            submessage_id::INFO_TS => {
                Submessage::InfoTimestamp(InfoTimestampSubmessage::decode(raw)?)
            }
            submessage_id::INFO_DST => {
                Submessage::InfoDestination(InfoDestinationSubmessage::decode(raw)?)
            }
            other => {
                log::trace!("[rtps] Skipping unknown submessage id {:#04X}", other);
                Submessage::Unknown { id: other }
            }
        };

        submessages.push(parsed);
        offset += 4 + body.len();
    }

    Ok((sender_prefix, submessages))
}
