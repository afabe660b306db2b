// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! INFO_TS and INFO_DST submessage codecs (RTPS 2.3 Sections 8.3.7.9/8.3.7.7).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{
    put_submessage_header, read_i32, read_u32, split_submessage, submessage_id, RtpsCodecError,
    RtpsCodecResult, FLAG_ENDIANNESS,
};
use crate::core::types::{GuidPrefix, GUID_PREFIX_LEN};

// ============================================================================
// INFO_TS
// ============================================================================

/// INFO_TS: source timestamp for the submessages that follow.
///
/// RTPS time is seconds + a 2^-32 fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoTimestampSubmessage {
    pub seconds: i32,
    pub fraction: u32,
}

impl InfoTimestampSubmessage {
    /// Capture the current system time.
    #[must_use]
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| {
                log::debug!("[info_ts] System time before UNIX epoch, using timestamp 0");
                Duration::ZERO
            });
        Self::from_nanos(since_epoch.as_nanos() as u64)
    }

    /// Build from nanoseconds since the UNIX epoch.
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        let seconds_total = nanos / 1_000_000_000;
        let seconds = match i32::try_from(seconds_total) {
            Ok(value) => value,
            Err(_) => {
                log::debug!("[info_ts] Timestamp {}ns exceeds RTPS seconds range; clamping", nanos);
                i32::MAX
            }
        };
        let remainder = nanos % 1_000_000_000;
        let fraction = ((remainder << 32) / 1_000_000_000) as u32;
        Self { seconds, fraction }
    }

    /// Convert back to nanoseconds since the UNIX epoch.
    #[must_use]
    pub fn as_nanos(&self) -> u64 {
        let from_secs = self.seconds.max(0) as u64 * 1_000_000_000;
        let from_fraction = (u64::from(self.fraction) * 1_000_000_000) >> 32;
        from_secs + from_fraction
    }

    /// Encode including the 4-byte submessage header (12 bytes total).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        put_submessage_header(&mut buf, submessage_id::INFO_TS, FLAG_ENDIANNESS, 8);
        buf.extend_from_slice(&self.seconds.to_le_bytes());
        buf.extend_from_slice(&self.fraction.to_le_bytes());
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, _flags, body) = split_submessage(buf)?;
        if id != submessage_id::INFO_TS {
            return Err(RtpsCodecError::InvalidParameter("not an INFO_TS submessage"));
        }
        Ok(Self {
            seconds: read_i32(body, 0)?,
            fraction: read_u32(body, 4)?,
        })
    }
}

// ============================================================================
// INFO_DST
// ============================================================================

/// INFO_DST: destination participant for the submessages that follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoDestinationSubmessage {
    pub guid_prefix: GuidPrefix,
}

impl InfoDestinationSubmessage {
    #[must_use]
    pub fn new(guid_prefix: GuidPrefix) -> Self {
        Self { guid_prefix }
    }

    /// All-zero prefix: applies to every participant.
    #[must_use]
    pub fn broadcast() -> Self {
        Self {
            guid_prefix: [0; GUID_PREFIX_LEN],
        }
    }

    /// Encode including the 4-byte submessage header (16 bytes total).
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16);
        put_submessage_header(&mut buf, submessage_id::INFO_DST, FLAG_ENDIANNESS, 12);
        buf.extend_from_slice(&self.guid_prefix);
        buf
    }

    /// Decode from a full submessage (header included).
    pub fn decode(buf: &[u8]) -> RtpsCodecResult<Self> {
        let (id, _flags, body) = split_submessage(buf)?;
        if id != submessage_id::INFO_DST {
            return Err(RtpsCodecError::InvalidParameter(
                "not an INFO_DST submessage",
            ));
        }
        let guid_prefix: GuidPrefix = body
            .get(..GUID_PREFIX_LEN)
            .and_then(|s| s.try_into().ok())
            .ok_or(RtpsCodecError::Truncated)?;
        Ok(Self { guid_prefix })
    }
}
