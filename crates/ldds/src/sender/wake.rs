// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Two-tier wake gate: atomic fast path, condvar for idle waits.
//!
//! Producers call [`notify`](WakeNotifier::notify) (a single atomic store on
//! the hot path); a consumer spinning on [`check_and_clear`]
//! (WakeNotifier::check_and_clear) never touches a lock, and one that went
//! to sleep in [`wait_timeout`](WakeNotifier::wait_timeout) is woken through
//! the condvar.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Wake notification shared between producers and one or more consumers.
#[derive(Debug, Default)]
pub struct WakeNotifier {
    pending: AtomicBool,
    sleepers: Mutex<usize>,
    condvar: Condvar,
}

impl WakeNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Signal that work is pending. Lock-free unless a consumer is asleep.
    pub fn notify(&self) {
        self.pending.store(true, Ordering::Release);
        if *self.sleepers.lock() > 0 {
            self.condvar.notify_one();
        }
    }

    /// Wake every sleeping consumer (shutdown).
    pub fn notify_all(&self) {
        self.pending.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    /// Take the pending flag without blocking.
    pub fn check_and_clear(&self) -> bool {
        self.pending.swap(false, Ordering::Acquire)
    }

    /// Block until notified or `timeout` elapses. Returns `true` when a
    /// notification was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        let mut sleepers = self.sleepers.lock();
        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }

        *sleepers += 1;
        let result = self.condvar.wait_for(&mut sleepers, timeout);
        *sleepers -= 1;

        if self.pending.swap(false, Ordering::Acquire) {
            return true;
        }
        !result.timed_out() && self.pending.swap(false, Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_fast_path() {
        let notifier = WakeNotifier::new();
        assert!(!notifier.check_and_clear());
        notifier.notify();
        assert!(notifier.check_and_clear());
        assert!(!notifier.check_and_clear());
    }

    #[test]
    fn test_notify_wakes_sleeper() {
        let notifier = WakeNotifier::shared();
        let remote = Arc::clone(&notifier);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.notify();
        });

        let start = Instant::now();
        assert!(notifier.wait_timeout(Duration::from_millis(500)));
        assert!(start.elapsed() < Duration::from_millis(200));
        handle.join().expect("notifier thread");
    }

    #[test]
    fn test_timeout_without_notify() {
        let notifier = WakeNotifier::new();
        let start = Instant::now();
        assert!(!notifier.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_pending_notification_returns_immediately() {
        let notifier = WakeNotifier::new();
        notifier.notify();

        let start = Instant::now();
        assert!(notifier.wait_timeout(Duration::from_millis(500)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
