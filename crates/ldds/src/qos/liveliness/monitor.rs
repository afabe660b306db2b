// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

use super::{Liveliness, LivelinessKind};
use std::time::{Duration, Instant};

/// Observed transition reported by [`LivelinessMonitor::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivelinessTransition {
    /// No state change since the previous poll.
    Unchanged,
    /// Lease expired since the previous poll.
    Lost,
    /// A fresh assertion arrived after the lease had expired.
    Recovered,
}

/// Lease tracker for a single writer.
///
/// Alive/lost transitions alternate strictly: once `poll` reports `Lost`,
/// only a fresh [`assert_alive`](Self::assert_alive) can produce `Recovered`.
#[derive(Debug)]
pub struct LivelinessMonitor {
    kind: LivelinessKind,
    lease_duration: Duration,
    last_assert: Instant,
    alive: bool,
}

impl LivelinessMonitor {
    #[must_use]
    pub fn new(kind: LivelinessKind, lease_duration: Duration) -> Self {
        Self {
            kind,
            lease_duration,
            last_assert: Instant::now(),
            alive: true,
        }
    }

    #[must_use]
    pub fn from_policy(policy: &Liveliness) -> Self {
        Self::new(policy.kind, policy.lease_duration)
    }

    /// Record a fresh assertion.
    pub fn assert_alive(&mut self) {
        self.last_assert = Instant::now();
    }

    /// Re-evaluate the lease and report the transition, if any.
    pub fn poll(&mut self) -> LivelinessTransition {
        let expired = !self.is_infinite() && self.last_assert.elapsed() > self.lease_duration;
        match (self.alive, expired) {
            (true, true) => {
                self.alive = false;
                LivelinessTransition::Lost
            }
            (false, false) => {
                self.alive = true;
                LivelinessTransition::Recovered
            }
            _ => LivelinessTransition::Unchanged,
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.is_infinite() || (self.alive && self.last_assert.elapsed() <= self.lease_duration)
    }

    #[must_use]
    pub fn kind(&self) -> LivelinessKind {
        self.kind
    }

    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// Replace the lease (discovery update); the current assertion window
    /// is kept.
    pub fn set_lease_duration(&mut self, lease_duration: Duration) {
        self.lease_duration = lease_duration;
    }

    /// Time left before the lease expires; `None` for infinite leases.
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        if self.is_infinite() {
            return None;
        }
        Some(
            self.lease_duration
                .saturating_sub(self.last_assert.elapsed()),
        )
    }

    fn is_infinite(&self) -> bool {
        self.lease_duration == Duration::MAX
    }
}
