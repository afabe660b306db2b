// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Writer Liveliness Protocol (RTPS 2.3 Section 8.4.13).
//!
//! Publication side: periodic timers assert the liveliness of owned writers
//! and publish `ParticipantMessageData` samples through a built-in reliable
//! writer — one timer at the minimum automatic lease, one at the minimum
//! manual-by-participant lease. Manual-by-topic writers are asserted only by
//! explicit user calls and never produce participant-message samples.
//!
//! Subscription side: received samples refresh matched remote writers in a
//! [`LivelinessManager`]; a sweep timer turns lease expiry into strictly
//! alternating lost/recovered callbacks.

mod assertion;
mod manager;
mod participant_message;

pub use manager::{LivelinessCallback, LivelinessEvent, LivelinessManager};
pub use participant_message::{
    ParticipantMessageData, PARTICIPANT_MESSAGE_DATA_KIND_AUTOMATIC,
    PARTICIPANT_MESSAGE_DATA_KIND_MANUAL_BY_PARTICIPANT,
};

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::types::{Guid, GuidPrefix};
use crate::history::ChangeInput;
use crate::qos::{Liveliness, LivelinessKind};
use crate::writer::StatefulWriter;

use assertion::PeriodicTask;

/// Narrow capability the delivery engines use to assert liveliness when
/// data is published.
pub trait LivelinessAssertions: Send + Sync {
    fn assert_writer_liveliness(&self, writer: Guid);
}

/// Idle tick interval while a category has no finite-lease writers.
const IDLE_TICK: Duration = Duration::from_millis(100);
/// Floor for the subscription sweep interval.
const MIN_SWEEP: Duration = Duration::from_millis(10);

#[derive(Default)]
struct WlpTimers {
    automatic: Option<PeriodicTask>,
    manual_by_participant: Option<PeriodicTask>,
    sub_sweep: Option<PeriodicTask>,
}

/// Per-participant Writer Liveliness Protocol subsystem.
pub struct Wlp {
    participant_prefix: GuidPrefix,
    builtin_writer: Arc<StatefulWriter>,
    pub_manager: LivelinessManager,
    sub_manager: LivelinessManager,
    timers: Mutex<WlpTimers>,
    /// Handed to the timer threads so they keep no strong reference.
    weak_self: Weak<Wlp>,
}

impl Wlp {
    /// Build the WLP over its built-in participant-message writer.
    ///
    /// `pub_events` receives transitions of owned writers, `sub_events`
    /// transitions of matched remote writers.
    pub fn new(
        participant_prefix: GuidPrefix,
        builtin_writer: Arc<StatefulWriter>,
        pub_events: LivelinessCallback,
        sub_events: LivelinessCallback,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            participant_prefix,
            builtin_writer,
            pub_manager: LivelinessManager::new(pub_events),
            sub_manager: LivelinessManager::new(sub_events),
            timers: Mutex::new(WlpTimers::default()),
            weak_self: weak.clone(),
        })
    }

    #[must_use]
    pub fn builtin_writer(&self) -> &Arc<StatefulWriter> {
        &self.builtin_writer
    }

    // ------------------------------------------------------------------
    // Publication side
    // ------------------------------------------------------------------

    /// Register an owned writer with the protocol.
    pub fn add_local_writer(&self, guid: Guid, policy: &Liveliness) -> bool {
        let added = self.pub_manager.track(guid, policy.kind, policy.lease_duration);
        if !policy.is_infinite() {
            match policy.kind {
                LivelinessKind::Automatic => self.ensure_assertion_timer(LivelinessKind::Automatic),
                LivelinessKind::ManualByParticipant => {
                    self.ensure_assertion_timer(LivelinessKind::ManualByParticipant);
                }
                // No timer: asserted only through explicit user calls.
                LivelinessKind::ManualByTopic => {}
            }
        }
        added
    }

    pub fn remove_local_writer(&self, guid: Guid) -> bool {
        self.pub_manager.untrack(guid)
    }

    /// Assert every owned writer of `kind` (user API).
    pub fn assert_liveliness(&self, kind: LivelinessKind) -> bool {
        let asserted = self.pub_manager.assert_kind(kind);
        if asserted > 0 && kind != LivelinessKind::ManualByTopic {
            self.publish_assertion(kind);
        }
        asserted > 0
    }

    /// Assert one writer, registering it on first sight (user API).
    pub fn assert_writer_liveliness_with(
        &self,
        writer: Guid,
        kind: LivelinessKind,
        lease: Duration,
    ) -> bool {
        self.pub_manager.track(writer, kind, lease);
        let asserted = self.pub_manager.assert_writer(writer);
        if asserted && kind != LivelinessKind::ManualByTopic {
            self.publish_assertion(kind);
        }
        asserted
    }

    // ------------------------------------------------------------------
    // Subscription side
    // ------------------------------------------------------------------

    /// Track a matched remote writer (fed by discovery).
    pub fn matched_remote_writer_add(
        &self,
        writer: Guid,
        kind: LivelinessKind,
        lease: Duration,
    ) {
        self.sub_manager.track(writer, kind, lease);
        self.ensure_sub_sweep();
    }

    pub fn matched_remote_writer_remove(&self, writer: Guid) -> bool {
        self.sub_manager.untrack(writer)
    }

    /// A peer participant asserted the given liveliness category.
    pub fn on_peer_assertion(&self, prefix: GuidPrefix, kind: LivelinessKind) {
        let touched = self.sub_manager.assert_participant(prefix, kind);
        log::trace!(
            "[WLP] Peer assertion from {:02X?} ({:?}) refreshed {} writers",
            &prefix[..4],
            kind,
            touched
        );
    }

    /// Feed a received participant-message sample into the protocol.
    pub fn on_participant_message(&self, sample: &ParticipantMessageData) {
        match sample.liveliness_kind() {
            Some(kind) => self.on_peer_assertion(sample.guid_prefix, kind),
            None => log::debug!(
                "[WLP] Ignoring participant message with unknown kind {:02X?}",
                sample.kind
            ),
        }
    }

    /// Sweep remote-writer leases immediately (tests, shutdown paths).
    pub fn check_subscriptions_now(&self) {
        self.sub_manager.check_now();
    }

    /// Liveliness of a matched remote writer, if tracked.
    #[must_use]
    pub fn remote_writer_alive(&self, writer: Guid) -> Option<bool> {
        self.sub_manager.is_alive(writer)
    }

    /// Stop all protocol timers.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        timers.automatic = None;
        timers.manual_by_participant = None;
        timers.sub_sweep = None;
    }

    // ------------------------------------------------------------------
    // Timer plumbing
    // ------------------------------------------------------------------

    /// One assertion tick for a category; returns the next wait.
    fn on_tick(&self, kind: LivelinessKind) -> Duration {
        match kind {
            LivelinessKind::Automatic => {
                if self.pub_manager.assert_kind(LivelinessKind::Automatic) > 0 {
                    self.publish_assertion(LivelinessKind::Automatic);
                }
            }
            LivelinessKind::ManualByParticipant => {
                // Propagate user assertions onto the wire; never assert on
                // the writers' behalf.
                if self.pub_manager.any_alive(LivelinessKind::ManualByParticipant) {
                    self.publish_assertion(LivelinessKind::ManualByParticipant);
                }
            }
            LivelinessKind::ManualByTopic => {}
        }
        self.pub_manager.check_now();
        self.pub_manager.min_lease(kind).unwrap_or(IDLE_TICK)
    }

    fn publish_assertion(&self, kind: LivelinessKind) {
        let Some(sample) = ParticipantMessageData::assertion(self.participant_prefix, kind) else {
            return;
        };
        let input = ChangeInput::data(sample.encode()).with_instance(sample.instance_key());
        if let Err(e) = self.builtin_writer.write(input) {
            log::debug!("[WLP] Failed to publish {:?} assertion: {}", kind, e);
        }
    }

    fn ensure_assertion_timer(&self, kind: LivelinessKind) {
        let mut timers = self.timers.lock();
        let slot = match kind {
            LivelinessKind::Automatic => &mut timers.automatic,
            LivelinessKind::ManualByParticipant => &mut timers.manual_by_participant,
            LivelinessKind::ManualByTopic => return,
        };
        if slot.is_some() {
            return;
        }

        let weak: Weak<Wlp> = self.weak_self.clone();
        let name = match kind {
            LivelinessKind::Automatic => "ldds-wlp-automatic",
            _ => "ldds-wlp-manual",
        };
        *slot = Some(PeriodicTask::spawn(name, move || {
            weak.upgrade().map(|wlp| wlp.on_tick(kind))
        }));
    }

    fn ensure_sub_sweep(&self) {
        let mut timers = self.timers.lock();
        if timers.sub_sweep.is_some() {
            return;
        }

        let weak: Weak<Wlp> = self.weak_self.clone();
        timers.sub_sweep = Some(PeriodicTask::spawn("ldds-wlp-sweep", move || {
            let wlp = weak.upgrade()?;
            wlp.sub_manager.check_now();
            let wait = wlp
                .sub_manager
                .next_expiry()
                .map(|at| at.saturating_duration_since(std::time::Instant::now()))
                .unwrap_or(IDLE_TICK);
            Some(wait.clamp(MIN_SWEEP, IDLE_TICK))
        }));
    }
}

impl LivelinessAssertions for Wlp {
    fn assert_writer_liveliness(&self, writer: Guid) {
        self.pub_manager.assert_writer(writer);
    }
}

/// Engine-side hook routing assertions into the participant's WLP.
pub struct WlpAssertionHook {
    wlp: Weak<Wlp>,
}

impl WlpAssertionHook {
    #[must_use]
    pub fn new(wlp: &Arc<Wlp>) -> Self {
        Self {
            wlp: Arc::downgrade(wlp),
        }
    }
}

impl LivelinessAssertions for WlpAssertionHook {
    fn assert_writer_liveliness(&self, writer: Guid) {
        if let Some(wlp) = self.wlp.upgrade() {
            wlp.pub_manager.assert_writer(writer);
        }
    }
}
