// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Periodic tick thread for liveliness assertion and lease sweeps.
//!
//! The tick closure returns the wait until its next run, or `None` to stop
//! the thread. Dropping the handle signals the thread and joins it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::sender::WakeNotifier;

/// Handle owning one periodic tick thread.
pub(crate) struct PeriodicTask {
    stop: Arc<AtomicBool>,
    notifier: Arc<WakeNotifier>,
    thread: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a named tick thread. The first tick runs immediately.
    pub fn spawn(
        name: &str,
        mut tick: impl FnMut() -> Option<Duration> + Send + 'static,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let notifier = WakeNotifier::shared();
        let thread_stop = Arc::clone(&stop);
        let thread_notifier = Arc::clone(&notifier);

        #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                log::debug!("[PeriodicTask] {} started", thread_name());
                loop {
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    let Some(wait) = tick() else {
                        break;
                    };
                    thread_notifier.wait_timeout(wait);
                }
                log::debug!("[PeriodicTask] {} stopped", thread_name());
            })
            .expect("failed to spawn periodic task");

        Self {
            stop,
            notifier,
            thread: Some(thread),
        }
    }

    /// Run the tick as soon as possible instead of waiting out the period.
    pub fn kick(&self) {
        self.notifier.notify_all();
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.notifier.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == std::thread::current().id() {
                // The tick thread itself released the last owner; it exits on
                // the stop flag, so detach rather than self-join.
                return;
            }
            let _ = thread.join();
        }
    }
}

fn thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}
