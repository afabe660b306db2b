// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Sequence and fragment number semantics.
//!
//! Sequence numbers are 64-bit signed, assigned per writer starting at 1.
//! On the wire they travel as a high `i32` / low `u32` pair (RTPS v2.5
//! Sec.9.3.2). Fragment numbers are 32-bit unsigned and 1-based per change.

/// Per-writer sample sequence number.
pub type SequenceNumber = i64;

/// Sentinel for "no sequence number" (RTPS SEQUENCENUMBER_UNKNOWN).
pub const SEQUENCE_NUMBER_UNKNOWN: SequenceNumber = -1;
/// Lowest valid sequence number a writer assigns.
pub const SEQUENCE_NUMBER_MIN: SequenceNumber = 1;
/// Upper bound for range queries.
pub const SEQUENCE_NUMBER_MAX: SequenceNumber = i64::MAX;

/// 1-based fragment number within one fragmented change.
pub type FragmentNumber = u32;

/// Split a sequence number into its wire representation.
#[inline]
#[must_use]
pub fn sequence_number_to_wire(sn: SequenceNumber) -> (i32, u32) {
    ((sn >> 32) as i32, sn as u32)
}

/// Rebuild a sequence number from its wire representation.
#[inline]
#[must_use]
pub fn sequence_number_from_wire(high: i32, low: u32) -> SequenceNumber {
    (i64::from(high) << 32) | i64::from(low)
}
