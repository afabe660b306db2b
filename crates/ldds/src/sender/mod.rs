// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Cooperative asynchronous send scheduler.
//!
//! One or a few worker threads drain many writers. Each registered writer
//! has {present, wake deadline, in-progress} state; workers repeatedly pick
//! the present writer with the earliest due deadline (FIFO on ties), run its
//! send pass, and re-arm it with whatever deadline the writer computes
//! (heartbeat period, fragment pacing, flow-controller back-off).
//!
//! Guarantees:
//! - a writer never runs on two workers at once;
//! - per writer, wake order equals run order;
//! - after [`unregister_writer`](AsyncSender::unregister_writer) returns, no
//!   further callback fires on that writer.

mod wake;

pub use wake::WakeNotifier;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::core::types::Guid;

/// What a send pass tells the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    /// Work remains queued (controller back-pressure, group timeout).
    pub remaining: bool,
    /// When the writer wants to run again regardless of new submissions.
    pub next_deadline: Option<Instant>,
}

impl SendOutcome {
    /// Nothing left and no timed work pending.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            remaining: false,
            next_deadline: None,
        }
    }

    /// Re-run at `deadline` (periodic heartbeat, pacing).
    #[must_use]
    pub fn rearm(deadline: Instant) -> Self {
        Self {
            remaining: false,
            next_deadline: Some(deadline),
        }
    }

    /// Work remains; retry at `deadline` if one is given, else immediately.
    #[must_use]
    pub fn backlog(deadline: Option<Instant>) -> Self {
        Self {
            remaining: true,
            next_deadline: deadline,
        }
    }
}

/// A writer drivable by the async sender.
pub trait AsyncWriter: Send + Sync {
    fn guid(&self) -> Guid;

    /// One bounded send pass under the writer's own lock.
    fn send_any_unsent_changes(&self) -> SendOutcome;
}

struct Entry {
    guid: Guid,
    writer: Arc<dyn AsyncWriter>,
    present: bool,
    deadline: Instant,
    fifo: u64,
    in_progress: bool,
    remove_requested: bool,
}

#[derive(Default)]
struct State {
    entries: Vec<Entry>,
    fifo_counter: u64,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    removed: Condvar,
    nudge_rx: Receiver<()>,
}

/// Idle poll bound; nudges normally arrive much sooner.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Scheduler multiplexing asynchronous writers over a small worker pool.
pub struct AsyncSender {
    shared: Arc<Shared>,
    nudge_tx: Sender<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncSender {
    /// Spawn `worker_count` send threads (at least one).
    #[must_use]
    pub fn new(worker_count: usize) -> Arc<Self> {
        let (nudge_tx, nudge_rx) = bounded::<()>(64);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            removed: Condvar::new(),
            nudge_rx,
        });

        let sender = Arc::new(Self {
            shared: Arc::clone(&shared),
            nudge_tx,
            workers: Mutex::new(Vec::new()),
        });

        let count = worker_count.max(1);
        let mut workers = sender.workers.lock();
        for idx in 0..count {
            let shared = Arc::clone(&shared);
            #[allow(clippy::expect_used)] // thread spawn failure is unrecoverable
            let handle = std::thread::Builder::new()
                .name(format!("ldds-sender-{idx}"))
                .spawn(move || worker_loop(&shared))
                .expect("failed to spawn sender worker");
            workers.push(handle);
        }
        drop(workers);

        sender
    }

    /// Make a writer known to the scheduler (idle until woken).
    pub fn register_writer(&self, writer: Arc<dyn AsyncWriter>) {
        let guid = writer.guid();
        let mut state = self.shared.state.lock();
        if state.entries.iter().any(|e| e.guid == guid) {
            log::debug!("[AsyncSender] Writer {} already registered", guid);
            return;
        }
        state.entries.push(Entry {
            guid,
            writer,
            present: false,
            deadline: Instant::now(),
            fifo: 0,
            in_progress: false,
            remove_requested: false,
        });
    }

    /// Remove a writer, blocking until any in-flight pass on it completes.
    ///
    /// Returns `false` when the writer was not registered.
    pub fn unregister_writer(&self, guid: Guid) -> bool {
        let mut state = self.shared.state.lock();
        let Some(idx) = state.entries.iter().position(|e| e.guid == guid) else {
            return false;
        };

        if state.entries[idx].in_progress {
            state.entries[idx].remove_requested = true;
            while state.entries.iter().any(|e| e.guid == guid) {
                self.shared.removed.wait(&mut state);
            }
        } else {
            state.entries.remove(idx);
        }
        true
    }

    /// Queue a writer for sending no later than `deadline` (now if `None`).
    ///
    /// A nearer deadline re-sorts; a later one is ignored for an already
    /// queued writer.
    pub fn wake_up(&self, guid: Guid, deadline: Option<Instant>) {
        {
            let mut state = self.shared.state.lock();
            let fifo = {
                state.fifo_counter += 1;
                state.fifo_counter
            };
            let Some(entry) = state.entries.iter_mut().find(|e| e.guid == guid) else {
                log::debug!("[AsyncSender] wake_up for unregistered writer {}", guid);
                return;
            };
            if entry.remove_requested {
                return;
            }
            let target = deadline.unwrap_or_else(Instant::now);
            if entry.present {
                entry.deadline = entry.deadline.min(target);
            } else {
                entry.present = true;
                entry.deadline = target;
                entry.fifo = fifo;
            }
        }
        // A full channel already guarantees a pending worker scan.
        let _ = self.nudge_tx.try_send(());
    }

    /// Stop the workers and join them. Registered writers are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        let workers = {
            let mut workers = self.workers.lock();
            std::mem::take(&mut *workers)
        };
        for _ in &workers {
            let _ = self.nudge_tx.try_send(());
        }
        for handle in workers {
            if handle.join().is_err() {
                log::error!("[AsyncSender] Worker panicked during shutdown");
            }
        }
        self.shared.state.lock().entries.clear();
    }

    #[cfg(test)]
    fn queued_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .filter(|e| e.present)
            .count()
    }
}

impl Drop for AsyncSender {
    fn drop(&mut self) {
        self.shutdown();
    }
}

enum WorkerStep {
    Run(Guid, Arc<dyn AsyncWriter>),
    Wait(Duration),
    Exit,
}

fn worker_loop(shared: &Shared) {
    loop {
        let step = next_step(shared);
        match step {
            WorkerStep::Exit => break,
            WorkerStep::Wait(wait) => {
                let _ = shared.nudge_rx.recv_timeout(wait);
            }
            WorkerStep::Run(guid, writer) => {
                let outcome = writer.send_any_unsent_changes();
                settle(shared, guid, outcome);
            }
        }
    }
}

fn next_step(shared: &Shared) -> WorkerStep {
    let mut state = shared.state.lock();
    if state.shutdown {
        return WorkerStep::Exit;
    }

    let now = Instant::now();
    let due = state
        .entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.present && !e.in_progress && !e.remove_requested && e.deadline <= now)
        .min_by_key(|(_, e)| (e.deadline, e.fifo))
        .map(|(idx, _)| idx);

    if let Some(idx) = due {
        let entry = &mut state.entries[idx];
        entry.in_progress = true;
        entry.present = false;
        return WorkerStep::Run(entry.guid, Arc::clone(&entry.writer));
    }

    let wait = state
        .entries
        .iter()
        .filter(|e| e.present && !e.in_progress && !e.remove_requested)
        .map(|e| e.deadline.saturating_duration_since(now))
        .min()
        .unwrap_or(IDLE_WAIT)
        .min(IDLE_WAIT);
    WorkerStep::Wait(wait)
}

fn settle(shared: &Shared, guid: Guid, outcome: SendOutcome) {
    let mut state = shared.state.lock();
    let Some(idx) = state.entries.iter().position(|e| e.guid == guid) else {
        return;
    };

    let fifo = {
        state.fifo_counter += 1;
        state.fifo_counter
    };
    let entry = &mut state.entries[idx];
    entry.in_progress = false;

    if entry.remove_requested {
        state.entries.remove(idx);
        shared.removed.notify_all();
        return;
    }

    let rearm = if outcome.remaining {
        Some(outcome.next_deadline.unwrap_or_else(Instant::now))
    } else {
        outcome.next_deadline
    };

    match rearm {
        Some(deadline) => {
            // A wake_up during the pass may already have queued an earlier
            // deadline; keep the nearest.
            if entry.present {
                entry.deadline = entry.deadline.min(deadline);
            } else {
                entry.present = true;
                entry.deadline = deadline;
                entry.fifo = fifo;
            }
        }
        None => {
            // Leave a wake_up received mid-pass intact.
        }
    }
}
