// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Protocol timing and runtime configuration.
//!
//! Wire-level constants live at module level; per-participant tunables are
//! collected in [`ProtocolConfig`], consumed at writer/participant creation.

use std::time::Duration;

// ============================================================================
// Wire constants
// ============================================================================

/// Largest RTPS message this engine will assemble before flushing.
pub const MAX_MESSAGE_SIZE: usize = 65_500;

/// Default fragment size for samples larger than one message (bytes).
pub const DEFAULT_FRAGMENT_SIZE: u16 = 1_024;

// ============================================================================
// Timing defaults
// ============================================================================

/// Default heartbeat period in milliseconds (RTPS recommendation: 100ms).
pub const DEFAULT_HEARTBEAT_PERIOD_MS: u64 = 100;

/// Default heartbeat jitter percentage (0-100).
pub const DEFAULT_HEARTBEAT_JITTER_PCT: u8 = 10;

/// Default window after a heartbeat during which ACKNACKs are ignored.
pub const DEFAULT_NACK_RESPONSE_DELAY_MS: u64 = 5;

/// Default window within which bursts of ACKNACKs coalesce into one repair.
pub const DEFAULT_NACK_SUPPRESSION_MS: u64 = 2;

/// Default bound for blocking sends and lock acquisition.
pub const DEFAULT_MAX_BLOCKING_TIME_MS: u64 = 100;

/// Default asynchronous sender worker thread count.
pub const DEFAULT_SEND_WORKERS: usize = 1;

/// Per-participant protocol configuration.
///
/// All fields have working defaults; builder-style `with_*` methods tweak
/// individual knobs.
///
/// ```
/// use ldds::config::ProtocolConfig;
/// use std::time::Duration;
///
/// let config = ProtocolConfig::default()
///     .with_heartbeat_period(Duration::from_millis(50))
///     .with_max_blocking_time(Duration::from_millis(20));
/// assert_eq!(config.heartbeat_period, Duration::from_millis(50));
/// ```
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Periodic heartbeat interval for reliable writers.
    pub heartbeat_period: Duration,
    /// Jitter applied to the heartbeat period (percent, 0-100).
    pub heartbeat_jitter_pct: u8,
    /// ACKNACKs arriving within this window after a heartbeat are ignored.
    pub nack_response_delay: Duration,
    /// Repair passes wait this long so ACKNACK bursts coalesce.
    pub nack_supression_duration: Duration,
    /// Deadline bound for blocking sends.
    pub max_blocking_time: Duration,
    /// Worker threads of the asynchronous sender.
    pub send_workers: usize,
    /// Fragment size used when a payload exceeds one message.
    pub fragment_size: u16,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            heartbeat_period: Duration::from_millis(DEFAULT_HEARTBEAT_PERIOD_MS),
            heartbeat_jitter_pct: DEFAULT_HEARTBEAT_JITTER_PCT,
            nack_response_delay: Duration::from_millis(DEFAULT_NACK_RESPONSE_DELAY_MS),
            nack_supression_duration: Duration::from_millis(DEFAULT_NACK_SUPPRESSION_MS),
            max_blocking_time: Duration::from_millis(DEFAULT_MAX_BLOCKING_TIME_MS),
            send_workers: DEFAULT_SEND_WORKERS,
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }
}

impl ProtocolConfig {
    #[must_use]
    pub fn with_heartbeat_period(mut self, period: Duration) -> Self {
        self.heartbeat_period = period;
        self
    }

    #[must_use]
    pub fn with_heartbeat_jitter_pct(mut self, pct: u8) -> Self {
        self.heartbeat_jitter_pct = pct.min(100);
        self
    }

    #[must_use]
    pub fn with_nack_response_delay(mut self, delay: Duration) -> Self {
        self.nack_response_delay = delay;
        self
    }

    #[must_use]
    pub fn with_nack_supression_duration(mut self, window: Duration) -> Self {
        self.nack_supression_duration = window;
        self
    }

    #[must_use]
    pub fn with_max_blocking_time(mut self, bound: Duration) -> Self {
        self.max_blocking_time = bound;
        self
    }

    #[must_use]
    pub fn with_send_workers(mut self, workers: usize) -> Self {
        self.send_workers = workers.max(1);
        self
    }

    #[must_use]
    pub fn with_fragment_size(mut self, size: u16) -> Self {
        self.fragment_size = size.max(1);
        self
    }
}
