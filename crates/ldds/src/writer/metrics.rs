// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Delivery observability counters.
//!
//! Relaxed atomics, safe to bump from any thread. Purely passive; the
//! embedding layer decides whether and where to export them.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one writer's delivery pipeline.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    data_sent: AtomicU64,
    data_frags_sent: AtomicU64,
    heartbeats_sent: AtomicU64,
    gaps_sent: AtomicU64,
    acknacks_received: AtomicU64,
    acknacks_suppressed: AtomicU64,
    nackfrags_received: AtomicU64,
    retransmits_sent: AtomicU64,
    changes_acknowledged: AtomicU64,
    send_timeouts: AtomicU64,
}

impl DeliveryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_data_sent(&self, count: u64) {
        self.data_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_data_frag_sent(&self, count: u64) {
        self.data_frags_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_heartbeat_sent(&self) {
        self.heartbeats_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gap_sent(&self) {
        self.gaps_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acknack_received(&self) {
        self.acknacks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_acknack_suppressed(&self) {
        self.acknacks_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_nackfrag_received(&self) {
        self.nackfrags_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retransmit_sent(&self, count: u64) {
        self.retransmits_sent.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_change_acknowledged(&self) {
        self.changes_acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent-enough snapshot for tests and telemetry.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            data_sent: self.data_sent.load(Ordering::Relaxed),
            data_frags_sent: self.data_frags_sent.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            gaps_sent: self.gaps_sent.load(Ordering::Relaxed),
            acknacks_received: self.acknacks_received.load(Ordering::Relaxed),
            acknacks_suppressed: self.acknacks_suppressed.load(Ordering::Relaxed),
            nackfrags_received: self.nackfrags_received.load(Ordering::Relaxed),
            retransmits_sent: self.retransmits_sent.load(Ordering::Relaxed),
            changes_acknowledged: self.changes_acknowledged.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`DeliveryMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub data_sent: u64,
    pub data_frags_sent: u64,
    pub heartbeats_sent: u64,
    pub gaps_sent: u64,
    pub acknacks_received: u64,
    pub acknacks_suppressed: u64,
    pub nackfrags_received: u64,
    pub retransmits_sent: u64,
    pub changes_acknowledged: u64,
    pub send_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = DeliveryMetrics::new();
        metrics.record_data_sent(3);
        metrics.record_heartbeat_sent();
        metrics.record_heartbeat_sent();
        metrics.record_retransmit_sent(1);

        let snap = metrics.snapshot();
        assert_eq!(snap.data_sent, 3);
        assert_eq!(snap.heartbeats_sent, 2);
        assert_eq!(snap.retransmits_sent, 1);
        assert_eq!(snap.gaps_sent, 0);
    }
}
