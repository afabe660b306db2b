// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Lease bookkeeping for a set of writers.
//!
//! One manager instance serves the publication side (our own writers) and
//! another the subscription side (matched remote writers). Lost/recovered
//! events alternate strictly per writer and are delivered through the
//! callback handed in at construction, outside the internal lock.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::types::{Guid, GuidPrefix};
use crate::qos::{LivelinessKind, LivelinessMonitor, LivelinessTransition};

/// A liveliness state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivelinessEvent {
    Lost {
        writer: Guid,
        kind: LivelinessKind,
        lease: Duration,
    },
    Recovered {
        writer: Guid,
        kind: LivelinessKind,
        lease: Duration,
    },
}

/// Callback receiving liveliness transitions.
pub type LivelinessCallback = Box<dyn Fn(&LivelinessEvent) + Send + Sync>;

struct TrackedWriter {
    guid: Guid,
    monitor: LivelinessMonitor,
}

/// Tracks `{kind, lease, last assertion}` per writer and reports
/// transitions.
pub struct LivelinessManager {
    writers: Mutex<Vec<TrackedWriter>>,
    callback: LivelinessCallback,
}

impl LivelinessManager {
    #[must_use]
    pub fn new(callback: LivelinessCallback) -> Self {
        Self {
            writers: Mutex::new(Vec::new()),
            callback,
        }
    }

    /// Start tracking a writer (or refresh kind/lease of a known one).
    /// Returns `true` when the writer is new.
    pub fn track(&self, guid: Guid, kind: LivelinessKind, lease: Duration) -> bool {
        let mut writers = self.writers.lock();
        if let Some(tracked) = writers.iter_mut().find(|w| w.guid == guid) {
            if tracked.monitor.kind() != kind {
                tracked.monitor = LivelinessMonitor::new(kind, lease);
            } else {
                tracked.monitor.set_lease_duration(lease);
            }
            false
        } else {
            writers.push(TrackedWriter {
                guid,
                monitor: LivelinessMonitor::new(kind, lease),
            });
            true
        }
    }

    pub fn untrack(&self, guid: Guid) -> bool {
        let mut writers = self.writers.lock();
        let before = writers.len();
        writers.retain(|w| w.guid != guid);
        writers.len() != before
    }

    /// Assert one writer; fires `Recovered` if it had been declared lost.
    pub fn assert_writer(&self, guid: Guid) -> bool {
        let event = {
            let mut writers = self.writers.lock();
            let Some(tracked) = writers.iter_mut().find(|w| w.guid == guid) else {
                return false;
            };
            tracked.monitor.assert_alive();
            transition_event(tracked)
        };
        self.dispatch(event);
        true
    }

    /// Assert every tracked writer of `kind`.
    pub fn assert_kind(&self, kind: LivelinessKind) -> usize {
        let events: Vec<Option<LivelinessEvent>> = {
            let mut writers = self.writers.lock();
            writers
                .iter_mut()
                .filter(|w| w.monitor.kind() == kind)
                .map(|w| {
                    w.monitor.assert_alive();
                    transition_event(w)
                })
                .collect()
        };
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// Assert every writer of `kind` belonging to the given participant
    /// (subscription side, fed by received participant-message samples).
    pub fn assert_participant(&self, prefix: GuidPrefix, kind: LivelinessKind) -> usize {
        let events: Vec<Option<LivelinessEvent>> = {
            let mut writers = self.writers.lock();
            writers
                .iter_mut()
                .filter(|w| w.guid.prefix == prefix && w.monitor.kind() == kind)
                .map(|w| {
                    w.monitor.assert_alive();
                    transition_event(w)
                })
                .collect()
        };
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        count
    }

    /// Sweep every lease and fire transitions.
    pub fn check_now(&self) {
        let events: Vec<Option<LivelinessEvent>> = {
            let mut writers = self.writers.lock();
            writers.iter_mut().map(transition_event).collect()
        };
        for event in events {
            self.dispatch(event);
        }
    }

    #[must_use]
    pub fn is_alive(&self, guid: Guid) -> Option<bool> {
        self.writers
            .lock()
            .iter()
            .find(|w| w.guid == guid)
            .map(|w| w.monitor.is_alive())
    }

    /// Shortest lease among writers of `kind`; `None` when none is finite.
    #[must_use]
    pub fn min_lease(&self, kind: LivelinessKind) -> Option<Duration> {
        self.writers
            .lock()
            .iter()
            .filter(|w| w.monitor.kind() == kind)
            .map(|w| w.monitor.lease_duration())
            .filter(|lease| *lease != Duration::MAX)
            .min()
    }

    /// Earliest upcoming lease expiry across all tracked writers.
    #[must_use]
    pub fn next_expiry(&self) -> Option<Instant> {
        let now = Instant::now();
        self.writers
            .lock()
            .iter()
            .filter_map(|w| w.monitor.time_until_expiry())
            .map(|d| now + d)
            .min()
    }

    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.writers.lock().len()
    }

    /// Any writer of `kind` currently within its lease?
    #[must_use]
    pub fn any_alive(&self, kind: LivelinessKind) -> bool {
        self.writers
            .lock()
            .iter()
            .any(|w| w.monitor.kind() == kind && w.monitor.is_alive())
    }

    fn dispatch(&self, event: Option<LivelinessEvent>) {
        if let Some(event) = event {
            log::debug!("[LivelinessManager] {:?}", event);
            (self.callback)(&event);
        }
    }
}

fn transition_event(tracked: &mut TrackedWriter) -> Option<LivelinessEvent> {
    match tracked.monitor.poll() {
        LivelinessTransition::Unchanged => None,
        LivelinessTransition::Lost => Some(LivelinessEvent::Lost {
            writer: tracked.guid,
            kind: tracked.monitor.kind(),
            lease: tracked.monitor.lease_duration(),
        }),
        LivelinessTransition::Recovered => Some(LivelinessEvent::Recovered {
            writer: tracked.guid,
            kind: tracked.monitor.kind(),
            lease: tracked.monitor.lease_duration(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn guid(id: u8) -> Guid {
        Guid::new([id; 12], [0, 0, 0, 0x02])
    }

    fn manager_with_log() -> (Arc<Mutex<Vec<LivelinessEvent>>>, LivelinessManager) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let manager = LivelinessManager::new(Box::new(move |e| sink.lock().push(*e)));
        (events, manager)
    }

    #[test]
    fn test_track_untrack() {
        let (_, manager) = manager_with_log();
        assert!(manager.track(guid(1), LivelinessKind::Automatic, Duration::from_secs(1)));
        assert!(!manager.track(guid(1), LivelinessKind::Automatic, Duration::from_secs(2)));
        assert_eq!(manager.tracked_count(), 1);
        assert!(manager.untrack(guid(1)));
        assert!(!manager.untrack(guid(1)));
    }

    #[test]
    fn test_lost_then_recovered_alternate_strictly() {
        let (events, manager) = manager_with_log();
        manager.track(guid(1), LivelinessKind::Automatic, Duration::from_millis(20));

        thread::sleep(Duration::from_millis(40));
        manager.check_now();
        manager.check_now(); // second sweep must not re-fire

        assert_eq!(events.lock().len(), 1);
        assert!(matches!(events.lock()[0], LivelinessEvent::Lost { .. }));
        assert_eq!(manager.is_alive(guid(1)), Some(false));

        manager.assert_writer(guid(1));
        let log = events.lock().clone();
        assert_eq!(log.len(), 2);
        assert!(matches!(log[1], LivelinessEvent::Recovered { .. }));
        assert_eq!(manager.is_alive(guid(1)), Some(true));
    }

    #[test]
    fn test_assert_participant_touches_only_matching() {
        let (_, manager) = manager_with_log();
        manager.track(guid(1), LivelinessKind::Automatic, Duration::from_millis(30));
        manager.track(guid(2), LivelinessKind::Automatic, Duration::from_millis(30));
        manager.track(
            Guid::new([1; 12], [9, 9, 9, 9]),
            LivelinessKind::ManualByParticipant,
            Duration::from_millis(30),
        );

        assert_eq!(
            manager.assert_participant([1; 12], LivelinessKind::Automatic),
            1
        );
        assert_eq!(
            manager.assert_participant([9; 12], LivelinessKind::Automatic),
            0
        );
    }

    #[test]
    fn test_min_lease_ignores_infinite() {
        let (_, manager) = manager_with_log();
        manager.track(guid(1), LivelinessKind::Automatic, Duration::MAX);
        assert_eq!(manager.min_lease(LivelinessKind::Automatic), None);

        manager.track(guid(2), LivelinessKind::Automatic, Duration::from_millis(500));
        manager.track(guid(3), LivelinessKind::Automatic, Duration::from_millis(100));
        assert_eq!(
            manager.min_lease(LivelinessKind::Automatic),
            Some(Duration::from_millis(100))
        );
        assert_eq!(manager.min_lease(LivelinessKind::ManualByTopic), None);
    }

    #[test]
    fn test_callback_runs_outside_lock() {
        // A callback that re-enters the manager must not deadlock.
        let counter = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&counter);
        let manager = Arc::new(LivelinessManager::new(Box::new(move |_| {
            seen.fetch_add(1, Ordering::Relaxed);
        })));
        manager.track(guid(1), LivelinessKind::ManualByTopic, Duration::from_millis(10));
        thread::sleep(Duration::from_millis(20));
        manager.check_now();
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}
