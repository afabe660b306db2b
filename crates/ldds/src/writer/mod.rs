// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Publication-side delivery machinery.
//!
//! Two engines share one skeleton: a history cache, a matched-reader
//! registry with a deduplicating locator selector, and message groups that
//! batch submessages per destination.
//!
//! - [`StatelessWriter`]: best-effort, fire-and-forget, locator-aggregated
//!   sends.
//! - [`StatefulWriter`]: reliable, per-reader pending sets, the
//!   HEARTBEAT/ACKNACK dialogue, and GAP recovery.
//!
//! ```text
//! user write ──> WriterHistoryCache ──> engine
//!                                        ├── synchronous: MessageGroup -> Transport
//!                                        └── asynchronous: unsent queue -> AsyncSender
//! ```

mod collector;
mod locator_selector;
mod message_group;
mod metrics;
mod proxy;
mod registry;
mod stateful;
mod stateless;

pub use collector::{Collector, CollectorItem};
pub use locator_selector::LocatorSelector;
pub use message_group::MessageGroup;
pub use metrics::{DeliveryMetrics, MetricsSnapshot};
pub use proxy::{ChangeForReaderStatus, ReaderProxy};
pub use registry::{MatchedReaderRegistry, ReaderLocatorEntry};
pub use stateful::StatefulWriter;
pub use stateless::{SharedControllers, StatelessWriter};

use crate::core::types::{Guid, Locator};
use crate::qos::{Durability, Reliability};

/// Outcome of adding a reader to a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    /// New reader admitted.
    Added,
    /// Existing reader; locators/QoS refreshed.
    Updated,
    /// Registry allocation exhausted.
    Rejected,
}

/// How a writer pushes changes onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Send from the writing thread, bounded by `max_blocking_time`.
    #[default]
    Synchronous,
    /// Queue and let the async sender drain.
    Asynchronous,
}

/// Matched-reader slot allocation policy: {initial, maximum, increment}.
///
/// `maximum == 0` means bounded only by memory.
#[derive(Debug, Clone, Copy)]
pub struct ReaderAllocation {
    pub initial: usize,
    pub maximum: usize,
    pub increment: usize,
}

impl Default for ReaderAllocation {
    fn default() -> Self {
        Self {
            initial: 1,
            maximum: 0,
            increment: 1,
        }
    }
}

/// Discovery-provided description of a remote reader.
#[derive(Debug, Clone)]
pub struct ReaderProxyData {
    pub guid: Guid,
    pub unicast_locators: Vec<Locator>,
    pub multicast_locators: Vec<Locator>,
    pub expects_inline_qos: bool,
    pub reliability: Reliability,
    pub durability: Durability,
}

impl ReaderProxyData {
    #[must_use]
    pub fn new(guid: Guid) -> Self {
        Self {
            guid,
            unicast_locators: Vec::new(),
            multicast_locators: Vec::new(),
            expects_inline_qos: false,
            reliability: Reliability::BestEffort,
            durability: Durability::Volatile,
        }
    }

    #[must_use]
    pub fn with_unicast(mut self, locator: Locator) -> Self {
        self.unicast_locators.push(locator);
        self
    }

    #[must_use]
    pub fn with_multicast(mut self, locator: Locator) -> Self {
        self.multicast_locators.push(locator);
        self
    }

    #[must_use]
    pub fn with_expects_inline_qos(mut self, expects: bool) -> Self {
        self.expects_inline_qos = expects;
        self
    }

    #[must_use]
    pub fn reliable(mut self) -> Self {
        self.reliability = Reliability::Reliable;
        self
    }

    #[must_use]
    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }
}

/// Registry entry contract: both engines track remote readers, the stateful
/// one just tracks far more per reader.
pub trait RemoteReader: Send {
    fn from_proxy_data(data: &ReaderProxyData) -> Self;

    /// Refresh locators/QoS; returns `true` when the locator set changed.
    fn update_from(&mut self, data: &ReaderProxyData) -> bool;

    fn guid(&self) -> Guid;
    fn unicast_locators(&self) -> &[Locator];
    fn multicast_locators(&self) -> &[Locator];
    fn expects_inline_qos(&self) -> bool;
    fn durability(&self) -> Durability;
}
