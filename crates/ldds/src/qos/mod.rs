// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! QoS (Quality of Service) policies for publication endpoints.
//!
//! # Supported Policies
//!
//! - **Reliability**: BestEffort (fire-and-forget) or Reliable (ACKNACK
//!   driven retransmission)
//! - **History**: KeepLast(n) bounded queue, KeepAll within ResourceLimits
//! - **Durability**: Volatile, TransientLocal, Transient, Persistent
//! - **ResourceLimits**: max_samples, max_instances, max_samples_per_instance
//! - **Liveliness**: Automatic / ManualByParticipant / ManualByTopic with a
//!   lease duration
//!
//! # Examples
//!
//! ```
//! use ldds::qos::{QosProfile, History};
//!
//! // Default QoS (BestEffort, KeepLast(10))
//! let qos_default = QosProfile::default();
//!
//! // Custom QoS
//! let qos_custom = QosProfile {
//!     history: History::KeepLast(100),
//!     ..Default::default()
//! };
//! assert!(qos_custom.validate().is_ok());
//! ```

/// Liveliness QoS policy - writer aliveness assertions.
pub mod liveliness;

pub use liveliness::{Liveliness, LivelinessKind, LivelinessMonitor, LivelinessTransition};

/// Special value meaning "no limit". Corresponds to DDS LENGTH_UNLIMITED.
pub const LENGTH_UNLIMITED: usize = usize::MAX;

/// QoS Profile - collection of policies for a publication endpoint.
///
/// Validated at writer creation (fail-fast on invalid config).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QosProfile {
    /// Reliability policy.
    pub reliability: Reliability,
    /// History policy (KeepLast or KeepAll).
    pub history: History,
    /// Durability policy.
    pub durability: Durability,
    /// Resource limits (queue sizes, instances).
    pub resource_limits: ResourceLimits,
    /// History storage allocation policy.
    pub memory_policy: MemoryPolicy,
    /// Liveliness policy.
    pub liveliness: Liveliness,
}

impl Default for QosProfile {
    fn default() -> Self {
        Self {
            reliability: Reliability::BestEffort,
            history: History::KeepLast(10),
            durability: Durability::Volatile,
            resource_limits: ResourceLimits::default(),
            memory_policy: MemoryPolicy::PreallocatedWithRealloc,
            liveliness: Liveliness::default(),
        }
    }
}

impl QosProfile {
    /// Reliable delivery with a generous retransmission window.
    #[must_use]
    pub fn reliable() -> Self {
        Self {
            reliability: Reliability::Reliable,
            history: History::KeepLast(100),
            ..Default::default()
        }
    }

    /// Fire-and-forget delivery.
    #[must_use]
    pub fn best_effort() -> Self {
        Self::default()
    }

    /// Reliable delivery that replays history to late joiners.
    #[must_use]
    pub fn transient_local() -> Self {
        Self {
            durability: Durability::TransientLocal,
            ..Self::reliable()
        }
    }

    /// Validate QoS configuration.
    ///
    /// # Validation Rules
    ///
    /// - `History::KeepLast(n)` requires n > 0
    /// - `History::KeepAll` requires `ResourceLimits.max_samples` bounded
    /// - `max_samples >= max_samples_per_instance * max_instances` when all
    ///   three are bounded
    pub fn validate(&self) -> Result<(), String> {
        match self.history {
            History::KeepLast(0) => {
                return Err("History::KeepLast(n) requires n > 0".to_string());
            }
            History::KeepAll => {
                if self.resource_limits.max_samples == LENGTH_UNLIMITED {
                    return Err(
                        "History::KeepAll requires bounded ResourceLimits.max_samples".to_string()
                    );
                }
            }
            History::KeepLast(_) => {}
        }

        let rl = &self.resource_limits;
        if rl.max_samples != LENGTH_UNLIMITED
            && rl.max_instances != LENGTH_UNLIMITED
            && rl.max_samples_per_instance != LENGTH_UNLIMITED
            && rl.max_samples < rl.max_samples_per_instance.saturating_mul(rl.max_instances)
        {
            return Err(format!(
                "max_samples ({}) must be >= max_samples_per_instance ({}) * max_instances ({})",
                rl.max_samples, rl.max_samples_per_instance, rl.max_instances
            ));
        }

        Ok(())
    }
}

/// Reliability policy.
///
/// Determines delivery guarantees for samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Reliability {
    /// Fire-and-forget (no ACKs, no retransmission).
    #[default]
    BestEffort,
    /// Reliable delivery with NACK-driven retransmission.
    Reliable,
}

/// History policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum History {
    /// Keep only the last N samples per instance; oldest is evicted.
    KeepLast(u32),
    /// Keep everything; writes are rejected when limits are hit.
    KeepAll,
}

impl Default for History {
    fn default() -> Self {
        History::KeepLast(10)
    }
}

/// Durability policy.
///
/// Ordered: a writer offering a given level satisfies readers requesting
/// that level or below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Durability {
    /// New readers receive only data written after the match.
    #[default]
    Volatile,
    /// The writer replays its current history to late joiners.
    TransientLocal,
    /// Data outlives the writer (requires an external durability service).
    Transient,
    /// Data outlives the process (requires persistent storage).
    Persistent,
}

/// Resource limits for the history cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum total samples in the history cache.
    pub max_samples: usize,
    /// Maximum number of distinct instances (keyed topics).
    pub max_instances: usize,
    /// Maximum samples per instance for keyed topics.
    pub max_samples_per_instance: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_samples: 5000,
            max_instances: LENGTH_UNLIMITED,
            max_samples_per_instance: LENGTH_UNLIMITED,
        }
    }
}

/// History storage allocation policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MemoryPolicy {
    /// Capacity fixed at creation; writes beyond it are rejected.
    Preallocated,
    /// Capacity preallocated but allowed to grow.
    #[default]
    PreallocatedWithRealloc,
    /// Allocate on demand.
    Dynamic,
}
