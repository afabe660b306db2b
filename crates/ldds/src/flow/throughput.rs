// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Throughput-bounding flow controller.
//!
//! Admits pending items until the byte budget of the current period is
//! spent, defers the rest, and reports when the bucket will have refilled
//! enough for the first deferred item so the async sender can re-wake the
//! writer then.

use std::time::Instant;

use super::{FlowController, TokenBucket};
use crate::writer::Collector;

/// Bounds bytes per period using a token bucket.
pub struct ThroughputController {
    bucket: TokenBucket,
    next_release: Option<Instant>,
}

impl ThroughputController {
    /// `bytes_per_second` refill rate with a `burst_bytes` ceiling.
    #[must_use]
    pub fn new(bytes_per_second: u64, burst_bytes: u64) -> Self {
        Self {
            bucket: TokenBucket::new(bytes_per_second, burst_bytes),
            next_release: None,
        }
    }

    /// Adjust the rate at runtime.
    pub fn set_rate(&mut self, bytes_per_second: u64) {
        self.bucket.set_rate(bytes_per_second);
    }
}

impl FlowController for ThroughputController {
    fn process(&mut self, collector: &mut Collector) {
        self.next_release = None;

        let budget = self.bucket.tokens();
        let mut spent = 0u64;
        let mut admitted = 0usize;
        let mut first_deferred_bytes = None;

        for item in collector.items() {
            let bytes = item.size_bytes as u64;
            if spent + bytes <= budget {
                spent += bytes;
                admitted += 1;
            } else {
                first_deferred_bytes = Some(bytes);
                break;
            }
        }

        let deferred = collector.truncate(admitted);
        if deferred > 0 {
            // Admitted bytes are consumed on send; budget for the first
            // deferred item must refill on top of them.
            let needed = spent + first_deferred_bytes.unwrap_or(0);
            let wait = self.bucket.time_until_available(needed);
            self.next_release = Some(Instant::now() + wait);
            log::trace!(
                "[ThroughputController] Deferring {} items, retry in {:?}",
                deferred,
                wait
            );
        }
    }

    fn on_change_sent(&mut self, bytes: usize) {
        self.bucket.consume(bytes as u64);
    }

    fn next_release(&self) -> Option<Instant> {
        self.next_release
    }
}
