// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Transport contract consumed by the publication engines.
//!
//! Real transports (UDP unicast/multicast, TCP, shared memory) live outside
//! this crate; the engines only need deadline-bounded sends and a hook to
//! prepare per-locator sender resources. [`mem::MemTransport`] is the
//! in-memory double used throughout the test suite.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::core::types::Locator;
use crate::Result;

/// Outbound transport used by message groups.
pub trait Transport: Send + Sync {
    /// Prepare whatever per-locator state the transport needs. Called once
    /// per locator per participant, before the first send to it.
    fn create_sender_resource(&self, locator: &Locator);

    /// Send one RTPS message to a locator, failing with
    /// [`Error::WriteTimeout`](crate::Error::WriteTimeout) once the deadline
    /// passes.
    fn send(&self, message: &[u8], locator: &Locator, deadline: Instant) -> Result<()>;
}

/// Participant-owned, lazily populated sender-resource cache.
///
/// Sender resources are created per locator and reused by every writer of
/// the participant; the registry layer funnels all creation through here so
/// the transport hook runs exactly once per locator.
pub struct SenderResourceCache {
    transport: Arc<dyn Transport>,
    created: DashMap<Locator, ()>,
}

impl SenderResourceCache {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            created: DashMap::new(),
        }
    }

    /// Ensure sender resources exist for the locator.
    pub fn ensure(&self, locator: &Locator) {
        if self.created.insert(*locator, ()).is_none() {
            log::debug!("[SenderResourceCache] Creating sender resource for {}", locator);
            self.transport.create_sender_resource(locator);
        }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Number of distinct locators with resources.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        self.created.len()
    }
}

/// In-memory transport double for tests.
pub mod mem {
    use super::{Instant, Locator, Transport};
    use crate::{Error, Result};
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Records every sent message; can simulate a stalled link.
    #[derive(Default)]
    pub struct MemTransport {
        sent: Mutex<Vec<(Locator, Vec<u8>)>>,
        resources: Mutex<Vec<Locator>>,
        stall: Mutex<Option<Duration>>,
    }

    impl MemTransport {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Every `(locator, message)` pair sent so far, in send order.
        #[must_use]
        pub fn sent(&self) -> Vec<(Locator, Vec<u8>)> {
            self.sent.lock().clone()
        }

        /// Drain the send log.
        pub fn take_sent(&self) -> Vec<(Locator, Vec<u8>)> {
            std::mem::take(&mut *self.sent.lock())
        }

        /// Messages sent to one specific locator.
        #[must_use]
        pub fn sent_to(&self, locator: &Locator) -> Vec<Vec<u8>> {
            self.sent
                .lock()
                .iter()
                .filter(|(l, _)| l == locator)
                .map(|(_, m)| m.clone())
                .collect()
        }

        /// Locators for which sender resources were created, in order.
        #[must_use]
        pub fn sender_resources(&self) -> Vec<Locator> {
            self.resources.lock().clone()
        }

        /// Make every send take `delay`, tripping caller deadlines.
        pub fn stall(&self, delay: Duration) {
            *self.stall.lock() = Some(delay);
        }

        /// Lift a previously injected stall.
        pub fn unstall(&self) {
            *self.stall.lock() = None;
        }
    }

    impl Transport for MemTransport {
        fn create_sender_resource(&self, locator: &Locator) {
            self.resources.lock().push(*locator);
        }

        fn send(&self, message: &[u8], locator: &Locator, deadline: Instant) -> Result<()> {
            if let Some(delay) = *self.stall.lock() {
                let now = Instant::now();
                if now + delay > deadline {
                    // Block until the caller's budget is gone, like a wedged
                    // socket would.
                    std::thread::sleep(deadline.saturating_duration_since(now));
                    return Err(Error::WriteTimeout);
                }
                std::thread::sleep(delay);
            }
            self.sent.lock().push((*locator, message.to_vec()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_sender_resource_created_once_per_locator() {
        let transport = Arc::new(mem::MemTransport::new());
        let cache = SenderResourceCache::new(transport.clone());

        let a = Locator::udpv4(10, 0, 0, 1, 7400);
        let b = Locator::udpv4(10, 0, 0, 2, 7400);
        cache.ensure(&a);
        cache.ensure(&a);
        cache.ensure(&b);
        cache.ensure(&a);

        assert_eq!(cache.resource_count(), 2);
        assert_eq!(transport.sender_resources(), vec![a, b]);
    }

    #[test]
    fn test_mem_transport_records_sends() {
        let transport = mem::MemTransport::new();
        let locator = Locator::udpv4(127, 0, 0, 1, 7400);
        let deadline = Instant::now() + Duration::from_secs(1);

        transport
            .send(b"hello", &locator, deadline)
            .expect("send should succeed");

        assert_eq!(transport.sent_to(&locator), vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_mem_transport_stall_times_out() {
        let transport = mem::MemTransport::new();
        let locator = Locator::udpv4(127, 0, 0, 1, 7400);
        transport.stall(Duration::from_secs(10));

        let start = Instant::now();
        let result = transport.send(b"x", &locator, Instant::now() + Duration::from_millis(30));

        assert!(matches!(result, Err(crate::Error::WriteTimeout)));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(transport.sent().is_empty());

        transport.unstall();
        assert!(transport
            .send(b"x", &locator, Instant::now() + Duration::from_millis(30))
            .is_ok());
    }
}
