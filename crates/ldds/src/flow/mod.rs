// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Flow control over pending sends.
//!
//! A flow controller reshapes a [`Collector`] in place: dropping,
//! reordering, or deferring items. Controllers compose; the engines run
//! writer-local controllers first, then the participant-level ones, and
//! re-arm the async sender with the earliest release instant any controller
//! reports.

mod throughput;
mod token_bucket;

pub use throughput::ThroughputController;
pub use token_bucket::TokenBucket;

use std::time::Instant;

use crate::writer::Collector;

/// Admission/pacing function over pending sends.
pub trait FlowController: Send {
    /// Reshape the collector in place; items removed here stay queued in the
    /// writer and come back on a later pass.
    fn process(&mut self, collector: &mut Collector);

    /// A change (or fragment) the controller admitted was actually sent.
    fn on_change_sent(&mut self, bytes: usize) {
        let _ = bytes;
    }

    /// When deferred work should be retried; `None` when nothing is held
    /// back.
    fn next_release(&self) -> Option<Instant> {
        None
    }
}

/// Run `controllers` over the collector in order and collect the earliest
/// release deadline any of them reports.
pub fn run_controllers(
    controllers: &mut [Box<dyn FlowController>],
    collector: &mut Collector,
) -> Option<Instant> {
    let mut earliest: Option<Instant> = None;
    for controller in controllers.iter_mut() {
        controller.process(collector);
        earliest = match (earliest, controller.next_release()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }
    earliest
}

/// Tell every controller about a sent item.
pub fn notify_controllers_sent(controllers: &mut [Box<dyn FlowController>], bytes: usize) {
    for controller in controllers.iter_mut() {
        controller.on_change_sent(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct DropOdd;

    impl FlowController for DropOdd {
        fn process(&mut self, collector: &mut Collector) {
            collector.retain(|item| item.sequence_number % 2 == 0);
        }
    }

    struct KeepFirst {
        release: Instant,
    }

    impl FlowController for KeepFirst {
        fn process(&mut self, collector: &mut Collector) {
            collector.truncate(1);
        }

        fn next_release(&self) -> Option<Instant> {
            Some(self.release)
        }
    }

    #[test]
    fn test_controllers_compose_in_order() {
        let mut collector = Collector::new();
        for sn in 1..=6 {
            collector.add_change(sn, None, 10);
        }

        let release = Instant::now() + std::time::Duration::from_millis(50);
        let mut controllers: Vec<Box<dyn FlowController>> =
            vec![Box::new(DropOdd), Box::new(KeepFirst { release })];

        let deadline = run_controllers(&mut controllers, &mut collector);
        assert_eq!(deadline, Some(release));
        assert_eq!(collector.len(), 1);
        assert_eq!(collector.pop().map(|i| i.sequence_number), Some(2));
    }
}
