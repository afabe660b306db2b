// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Per-reader delivery state for the reliable writer (RTPS Sec.8.4.7
//! ReaderProxy).
//!
//! Each matched reader gets one proxy tracking, per sequence number, where
//! delivery stands:
//!
//! ```text
//! Unsent ──dispatch──> Underway ──pass end──> Unacknowledged ──ACKNACK base──> Acknowledged
//!    ^                                              │
//!    └───────────── ACKNACK set bit ── Requested <──┘
//! ```
//!
//! Acknowledged entries are dropped from the map; `highest_acked` remembers
//! the contiguous prefix the reader has confirmed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::core::types::{FragmentNumber, Guid, Locator, SequenceNumber};
use crate::qos::{Durability, Reliability};

use super::{ReaderProxyData, RemoteReader};

/// Delivery status of one change for one reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeForReaderStatus {
    /// Never dispatched to this reader.
    Unsent,
    /// Reader asked for a (re)send.
    Requested,
    /// Dispatched, waiting for acknowledgment.
    Unacknowledged,
    /// Confirmed by the reader.
    Acknowledged,
    /// In a message group right now.
    Underway,
}

#[derive(Debug, Clone)]
struct ChangeForReader {
    status: ChangeForReaderStatus,
    /// Fragments still owed to this reader; empty means the whole change
    /// travels as one DATA.
    pending_fragments: BTreeSet<FragmentNumber>,
    total_fragments: u32,
}

/// Writer-side state for one matched reliable reader.
pub struct ReaderProxy {
    guid: Guid,
    unicast: Vec<Locator>,
    multicast: Vec<Locator>,
    expects_inline_qos: bool,
    reliability: Reliability,
    durability: Durability,

    changes: BTreeMap<SequenceNumber, ChangeForReader>,
    highest_acked: SequenceNumber,

    heartbeat_count: u32,
    last_acknack_count: Option<u32>,
    last_nackfrag_count: Option<u32>,
    suppress_acknacks_until: Option<Instant>,
}

impl RemoteReader for ReaderProxy {
    fn from_proxy_data(data: &ReaderProxyData) -> Self {
        Self {
            guid: data.guid,
            unicast: data.unicast_locators.clone(),
            multicast: data.multicast_locators.clone(),
            expects_inline_qos: data.expects_inline_qos,
            reliability: data.reliability,
            durability: data.durability,
            changes: BTreeMap::new(),
            highest_acked: 0,
            heartbeat_count: 0,
            last_acknack_count: None,
            last_nackfrag_count: None,
            suppress_acknacks_until: None,
        }
    }

    fn update_from(&mut self, data: &ReaderProxyData) -> bool {
        let changed =
            self.unicast != data.unicast_locators || self.multicast != data.multicast_locators;
        self.unicast = data.unicast_locators.clone();
        self.multicast = data.multicast_locators.clone();
        self.expects_inline_qos = data.expects_inline_qos;
        changed
    }

    fn guid(&self) -> Guid {
        self.guid
    }

    fn unicast_locators(&self) -> &[Locator] {
        &self.unicast
    }

    fn multicast_locators(&self) -> &[Locator] {
        &self.multicast
    }

    fn expects_inline_qos(&self) -> bool {
        self.expects_inline_qos
    }

    fn durability(&self) -> Durability {
        self.durability
    }
}

impl ReaderProxy {
    #[must_use]
    pub fn reliability(&self) -> Reliability {
        self.reliability
    }

    /// Track a change that just entered the history.
    ///
    /// `underway` marks changes that are being dispatched synchronously in
    /// the same call.
    pub fn on_change_added(
        &mut self,
        sn: SequenceNumber,
        total_fragments: u32,
        underway: bool,
    ) {
        let pending_fragments = if underway {
            BTreeSet::new()
        } else {
            (1..=total_fragments).collect()
        };
        self.changes.insert(
            sn,
            ChangeForReader {
                status: if underway {
                    ChangeForReaderStatus::Underway
                } else {
                    ChangeForReaderStatus::Unsent
                },
                pending_fragments,
                total_fragments,
            },
        );
    }

    /// Consider everything up to `sn` already delivered (volatile join).
    pub fn advance_acked_to(&mut self, sn: SequenceNumber) {
        self.highest_acked = self.highest_acked.max(sn);
        let still_tracked = self.changes.split_off(&(sn + 1));
        self.changes = still_tracked;
    }

    /// Status of one tracked change.
    #[must_use]
    pub fn status_of(&self, sn: SequenceNumber) -> Option<ChangeForReaderStatus> {
        if sn <= self.highest_acked && !self.changes.contains_key(&sn) {
            return Some(ChangeForReaderStatus::Acknowledged);
        }
        self.changes.get(&sn).map(|c| c.status)
    }

    /// Highest sequence number in the contiguous acknowledged prefix.
    #[must_use]
    pub fn highest_acked(&self) -> SequenceNumber {
        self.highest_acked
    }

    #[must_use]
    pub fn is_acked(&self, sn: SequenceNumber) -> bool {
        sn <= self.highest_acked
    }

    /// Apply the positive part of an ACKNACK: everything below `base` is
    /// acknowledged. Returns the sequence numbers that newly became
    /// acknowledged.
    pub fn acknowledge_up_to(&mut self, base: SequenceNumber) -> Vec<SequenceNumber> {
        let acked = base - 1;
        if acked <= self.highest_acked {
            return Vec::new();
        }
        self.highest_acked = acked;

        let remaining = self.changes.split_off(&base);
        let newly_acked: Vec<SequenceNumber> = self.changes.keys().copied().collect();
        self.changes = remaining;
        newly_acked
    }

    /// Apply one requested (NACKed) sequence number. Returns `false` when
    /// the proxy does not track it (caller decides between GAP and drop).
    pub fn mark_requested(&mut self, sn: SequenceNumber) -> bool {
        let Some(change) = self.changes.get_mut(&sn) else {
            return false;
        };
        change.status = ChangeForReaderStatus::Requested;
        if change.total_fragments > 0 && change.pending_fragments.is_empty() {
            // Whole-change NACK on a fragmented sample: owe every fragment.
            change.pending_fragments = (1..=change.total_fragments).collect();
        }
        true
    }

    /// Apply a NACKFRAG: specific fragments of `sn` are owed again.
    pub fn mark_fragments_requested(
        &mut self,
        sn: SequenceNumber,
        fragments: impl IntoIterator<Item = FragmentNumber>,
    ) -> bool {
        let Some(change) = self.changes.get_mut(&sn) else {
            return false;
        };
        change.status = ChangeForReaderStatus::Requested;
        for fragment in fragments {
            if fragment >= 1 && fragment <= change.total_fragments {
                change.pending_fragments.insert(fragment);
            }
        }
        true
    }

    /// Pending work: (sn, owed fragments) for every Unsent/Requested change.
    #[must_use]
    pub fn pending_sends(&self) -> Vec<(SequenceNumber, Vec<FragmentNumber>)> {
        self.changes
            .iter()
            .filter(|(_, c)| {
                matches!(
                    c.status,
                    ChangeForReaderStatus::Unsent | ChangeForReaderStatus::Requested
                )
            })
            .map(|(sn, c)| (*sn, c.pending_fragments.iter().copied().collect()))
            .collect()
    }

    /// A whole change was put into a message group.
    pub fn mark_underway(&mut self, sn: SequenceNumber) {
        if let Some(change) = self.changes.get_mut(&sn) {
            change.status = ChangeForReaderStatus::Underway;
            change.pending_fragments.clear();
        }
    }

    /// One fragment was put into a message group; the change goes underway
    /// once nothing more is owed.
    pub fn mark_fragment_sent(&mut self, sn: SequenceNumber, fragment: FragmentNumber) {
        if let Some(change) = self.changes.get_mut(&sn) {
            change.pending_fragments.remove(&fragment);
            if change.pending_fragments.is_empty() {
                change.status = ChangeForReaderStatus::Underway;
            }
        }
    }

    /// End of a send pass: everything underway is now waiting for an ACK.
    pub fn settle_underway(&mut self) {
        for change in self.changes.values_mut() {
            if change.status == ChangeForReaderStatus::Underway {
                change.status = ChangeForReaderStatus::Unacknowledged;
            }
        }
    }

    /// A dispatch failed: everything underway is owed again from scratch.
    pub fn requeue_underway(&mut self) {
        for change in self.changes.values_mut() {
            if change.status == ChangeForReaderStatus::Underway {
                change.status = ChangeForReaderStatus::Unsent;
                if change.total_fragments > 0 {
                    change.pending_fragments = (1..=change.total_fragments).collect();
                }
            }
        }
    }

    /// Stop tracking a change (evicted from history before acknowledgment).
    pub fn forget_change(&mut self, sn: SequenceNumber) -> bool {
        self.changes.remove(&sn).is_some()
    }

    /// Any change not yet acknowledged?
    #[must_use]
    pub fn has_unacked(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Any Unsent/Requested work left?
    #[must_use]
    pub fn has_pending_sends(&self) -> bool {
        self.changes.values().any(|c| {
            matches!(
                c.status,
                ChangeForReaderStatus::Unsent | ChangeForReaderStatus::Requested
            )
        })
    }

    // ------------------------------------------------------------------
    // Heartbeat / ACKNACK bookkeeping
    // ------------------------------------------------------------------

    /// Next heartbeat count for this reader (strictly increasing).
    pub fn next_heartbeat_count(&mut self) -> u32 {
        self.heartbeat_count += 1;
        self.heartbeat_count
    }

    /// Arm the post-heartbeat ACKNACK suppression window.
    pub fn note_heartbeat_sent(&mut self, nack_response_delay: Duration) {
        if !nack_response_delay.is_zero() {
            self.suppress_acknacks_until = Some(Instant::now() + nack_response_delay);
        }
    }

    /// Whether an ACKNACK arriving now falls into the suppression window.
    #[must_use]
    pub fn acknack_suppressed(&self, now: Instant) -> bool {
        self.suppress_acknacks_until.is_some_and(|until| now < until)
    }

    /// Replay guard: accept only ACKNACKs with a fresh count.
    pub fn accept_acknack(&mut self, count: u32) -> bool {
        if self.last_acknack_count.is_some_and(|last| count <= last) {
            return false;
        }
        self.last_acknack_count = Some(count);
        true
    }

    /// Replay guard for NACKFRAG counts.
    pub fn accept_nackfrag(&mut self, count: u32) -> bool {
        if self.last_nackfrag_count.is_some_and(|last| count <= last) {
            return false;
        }
        self.last_nackfrag_count = Some(count);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy() -> ReaderProxy {
        let data = ReaderProxyData::new(Guid::new([1; 12], [0, 0, 0, 0x07]))
            .reliable()
            .with_unicast(Locator::udpv4(10, 0, 0, 1, 7400));
        ReaderProxy::from_proxy_data(&data)
    }

    #[test]
    fn test_change_lifecycle() {
        let mut p = proxy();
        p.on_change_added(1, 0, false);
        assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Unsent));

        p.mark_underway(1);
        assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Underway));

        p.settle_underway();
        assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Unacknowledged));

        let acked = p.acknowledge_up_to(2);
        assert_eq!(acked, vec![1]);
        assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Acknowledged));
        assert!(p.is_acked(1));
        assert!(!p.has_unacked());
    }

    #[test]
    fn test_acknowledge_is_monotonic() {
        let mut p = proxy();
        for sn in 1..=5 {
            p.on_change_added(sn, 0, false);
        }
        assert_eq!(p.acknowledge_up_to(4), vec![1, 2, 3]);
        // A stale base must not regress or re-report
        assert!(p.acknowledge_up_to(2).is_empty());
        assert_eq!(p.highest_acked(), 3);
        assert_eq!(p.acknowledge_up_to(6), vec![4, 5]);
    }

    #[test]
    fn test_requested_resend_cycle() {
        let mut p = proxy();
        p.on_change_added(3, 0, false);
        p.mark_underway(3);
        p.settle_underway();

        assert!(p.mark_requested(3));
        assert_eq!(p.status_of(3), Some(ChangeForReaderStatus::Requested));
        assert_eq!(p.pending_sends(), vec![(3, vec![])]);

        // Unknown SN is the caller's cue to emit a GAP
        assert!(!p.mark_requested(99));
    }

    #[test]
    fn test_fragmented_change_tracking() {
        let mut p = proxy();
        p.on_change_added(1, 10, false);
        assert_eq!(
            p.pending_sends(),
            vec![(1, (1..=10).collect::<Vec<_>>())]
        );

        for fragment in 1..=9 {
            p.mark_fragment_sent(1, fragment);
            assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Unsent));
        }
        p.mark_fragment_sent(1, 10);
        assert_eq!(p.status_of(1), Some(ChangeForReaderStatus::Underway));
        p.settle_underway();

        // NACKFRAG for two specific fragments
        assert!(p.mark_fragments_requested(1, [4, 7]));
        assert_eq!(p.pending_sends(), vec![(1, vec![4, 7])]);

        // Out-of-range fragment numbers are ignored
        assert!(p.mark_fragments_requested(1, [0, 11]));
        assert_eq!(p.pending_sends(), vec![(1, vec![4, 7])]);
    }

    #[test]
    fn test_volatile_join_skips_history() {
        let mut p = proxy();
        p.advance_acked_to(10);
        assert!(p.is_acked(10));
        assert!(!p.has_unacked());
        p.on_change_added(11, 0, false);
        assert!(p.has_pending_sends());
    }

    #[test]
    fn test_heartbeat_counts_strictly_increase() {
        let mut p = proxy();
        let a = p.next_heartbeat_count();
        let b = p.next_heartbeat_count();
        let c = p.next_heartbeat_count();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_acknack_replay_guard() {
        let mut p = proxy();
        assert!(p.accept_acknack(1));
        assert!(p.accept_acknack(2));
        assert!(!p.accept_acknack(2));
        assert!(!p.accept_acknack(1));
        assert!(p.accept_acknack(10));
    }

    #[test]
    fn test_suppression_window() {
        let mut p = proxy();
        let now = Instant::now();
        assert!(!p.acknack_suppressed(now));

        p.note_heartbeat_sent(Duration::from_millis(50));
        assert!(p.acknack_suppressed(Instant::now()));
        assert!(!p.acknack_suppressed(now + Duration::from_millis(200)));

        // Zero delay disables the window entirely
        let mut q = proxy();
        q.note_heartbeat_sent(Duration::ZERO);
        assert!(!q.acknack_suppressed(Instant::now()));
    }

    #[test]
    fn test_forget_change_on_eviction() {
        let mut p = proxy();
        p.on_change_added(1, 0, false);
        assert!(p.forget_change(1));
        assert!(!p.forget_change(1));
        assert!(!p.has_unacked());
    }
}
