// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Matched-reader registry.
//!
//! Slot-preallocated store of remote readers, generic over the per-reader
//! state the owning engine tracks. Every mutation recomputes the locator
//! selector and funnels newly seen locators through the participant's
//! sender-resource cache, so the transport hook runs exactly once per
//! locator.

use crate::core::types::{Guid, Locator};
use crate::qos::Durability;
use crate::transport::SenderResourceCache;

use super::{LocatorSelector, MatchResult, ReaderAllocation, ReaderProxyData, RemoteReader};

/// Remote reader entry for the best-effort engine: destinations only.
#[derive(Debug, Clone)]
pub struct ReaderLocatorEntry {
    guid: Guid,
    unicast: Vec<Locator>,
    multicast: Vec<Locator>,
    expects_inline_qos: bool,
    durability: Durability,
}

impl RemoteReader for ReaderLocatorEntry {
    fn from_proxy_data(data: &ReaderProxyData) -> Self {
        Self {
            guid: data.guid,
            unicast: data.unicast_locators.clone(),
            multicast: data.multicast_locators.clone(),
            expects_inline_qos: data.expects_inline_qos,
            durability: data.durability,
        }
    }

    fn update_from(&mut self, data: &ReaderProxyData) -> bool {
        let changed =
            self.unicast != data.unicast_locators || self.multicast != data.multicast_locators;
        self.unicast = data.unicast_locators.clone();
        self.multicast = data.multicast_locators.clone();
        self.expects_inline_qos = data.expects_inline_qos;
        self.durability = data.durability;
        changed
    }

    fn guid(&self) -> Guid {
        self.guid
    }

    fn unicast_locators(&self) -> &[Locator] {
        &self.unicast
    }

    fn multicast_locators(&self) -> &[Locator] {
        &self.multicast
    }

    fn expects_inline_qos(&self) -> bool {
        self.expects_inline_qos
    }

    fn durability(&self) -> Durability {
        self.durability
    }
}

/// Slot-preallocated registry of matched readers.
pub struct MatchedReaderRegistry<R: RemoteReader> {
    slots: Vec<Option<R>>,
    allocation: ReaderAllocation,
    selector: LocatorSelector,
    fixed_locators: Vec<Locator>,
}

impl<R: RemoteReader> MatchedReaderRegistry<R> {
    #[must_use]
    pub fn new(allocation: ReaderAllocation) -> Self {
        let mut slots = Vec::with_capacity(allocation.initial);
        slots.resize_with(allocation.initial, || None);
        Self {
            slots,
            allocation,
            selector: LocatorSelector::new(),
            fixed_locators: Vec::new(),
        }
    }

    /// Add a reader, or re-run the update path for an already known GUID.
    pub fn add(&mut self, data: &ReaderProxyData, resources: &SenderResourceCache) -> MatchResult {
        debug_assert!(!data.guid.is_unknown());

        if let Some(entry) = self.slot_mut(data.guid) {
            log::debug!(
                "[MatchedReaderRegistry] Reader {} already matched, updating",
                data.guid
            );
            entry.update_from(data);
            self.after_mutation(data, resources);
            return MatchResult::Updated;
        }

        let entry = R::from_proxy_data(data);
        if let Some(free) = self.slots.iter_mut().find(|s| s.is_none()) {
            *free = Some(entry);
        } else if self.can_grow() {
            self.slots.reserve(self.allocation.increment.max(1));
            self.slots.push(Some(entry));
        } else {
            log::debug!(
                "[MatchedReaderRegistry] Reader {} rejected, allocation exhausted (max {})",
                data.guid,
                self.allocation.maximum
            );
            return MatchResult::Rejected;
        }

        self.after_mutation(data, resources);
        MatchResult::Added
    }

    /// Remove a matched reader, returning its state for draining.
    pub fn remove(&mut self, guid: Guid) -> Option<R> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.as_ref().is_some_and(|r| r.guid() == guid))?;
        let entry = slot.take();
        self.selector.remove_entry(guid);
        entry
    }

    #[must_use]
    pub fn contains(&self, guid: Guid) -> bool {
        self.iter().any(|r| r.guid() == guid)
    }

    #[must_use]
    pub fn get(&self, guid: Guid) -> Option<&R> {
        self.iter().find(|r| r.guid() == guid)
    }

    pub fn get_mut(&mut self, guid: Guid) -> Option<&mut R> {
        self.slot_mut(guid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut R> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    pub fn for_each(&self, f: impl FnMut(&R)) {
        self.iter().for_each(f);
    }

    pub fn for_each_mut(&mut self, f: impl FnMut(&mut R)) {
        self.iter_mut().for_each(f);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extra non-discovered destinations included in every send.
    pub fn set_fixed_locators(
        &mut self,
        locators: Vec<Locator>,
        resources: &SenderResourceCache,
    ) {
        for locator in &locators {
            resources.ensure(locator);
        }
        self.fixed_locators = locators;
    }

    #[must_use]
    pub fn fixed_locators(&self) -> &[Locator] {
        &self.fixed_locators
    }

    /// Any matched reader or fixed destination at all?
    #[must_use]
    pub fn has_destinations(&self) -> bool {
        !self.is_empty() || !self.fixed_locators.is_empty()
    }

    #[must_use]
    pub fn selector(&self) -> &LocatorSelector {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut LocatorSelector {
        &mut self.selector
    }

    /// Union of the selector's current fan-out and the fixed locators.
    #[must_use]
    pub fn send_locators(&self) -> Vec<Locator> {
        let mut locators = self.selector.selected_locators();
        for locator in &self.fixed_locators {
            if !locators.contains(locator) {
                locators.push(*locator);
            }
        }
        locators
    }

    fn slot_mut(&mut self, guid: Guid) -> Option<&mut R> {
        self.slots
            .iter_mut()
            .filter_map(Option::as_mut)
            .find(|r| r.guid() == guid)
    }

    fn can_grow(&self) -> bool {
        self.allocation.maximum == 0 || self.slots.len() < self.allocation.maximum
    }

    fn after_mutation(&mut self, data: &ReaderProxyData, resources: &SenderResourceCache) {
        self.selector.clear();
        for reader in self.slots.iter().filter_map(Option::as_ref) {
            self.selector.add_entry(
                reader.guid(),
                reader.unicast_locators().to_vec(),
                reader.multicast_locators().to_vec(),
            );
        }
        for locator in data
            .unicast_locators
            .iter()
            .chain(data.multicast_locators.iter())
        {
            resources.ensure(locator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mem::MemTransport;
    use std::sync::Arc;

    fn resources() -> (Arc<MemTransport>, SenderResourceCache) {
        let transport = Arc::new(MemTransport::new());
        let cache = SenderResourceCache::new(transport.clone());
        (transport, cache)
    }

    fn guid(id: u8) -> Guid {
        Guid::new([id; 12], [0, 0, 0, 7])
    }

    fn proxy_data(id: u8, port: u16) -> ReaderProxyData {
        ReaderProxyData::new(guid(id)).with_unicast(Locator::udpv4(10, 0, 0, id, port))
    }

    #[test]
    fn test_add_then_update() {
        let (_, cache) = resources();
        let mut registry: MatchedReaderRegistry<ReaderLocatorEntry> =
            MatchedReaderRegistry::new(ReaderAllocation::default());

        assert_eq!(registry.add(&proxy_data(1, 7400), &cache), MatchResult::Added);
        assert_eq!(
            registry.add(&proxy_data(1, 7500), &cache),
            MatchResult::Updated
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.send_locators(),
            vec![Locator::udpv4(10, 0, 0, 1, 7500)]
        );
    }

    #[test]
    fn test_allocation_rejects_beyond_maximum() {
        let (_, cache) = resources();
        let allocation = ReaderAllocation {
            initial: 1,
            maximum: 2,
            increment: 1,
        };
        let mut registry: MatchedReaderRegistry<ReaderLocatorEntry> =
            MatchedReaderRegistry::new(allocation);

        assert_eq!(registry.add(&proxy_data(1, 7400), &cache), MatchResult::Added);
        assert_eq!(registry.add(&proxy_data(2, 7400), &cache), MatchResult::Added);
        assert_eq!(
            registry.add(&proxy_data(3, 7400), &cache),
            MatchResult::Rejected
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_slot_reused_after_remove() {
        let (_, cache) = resources();
        let allocation = ReaderAllocation {
            initial: 1,
            maximum: 1,
            increment: 1,
        };
        let mut registry: MatchedReaderRegistry<ReaderLocatorEntry> =
            MatchedReaderRegistry::new(allocation);

        assert_eq!(registry.add(&proxy_data(1, 7400), &cache), MatchResult::Added);
        assert!(registry.remove(guid(1)).is_some());
        assert!(registry.remove(guid(1)).is_none());
        assert_eq!(registry.add(&proxy_data(2, 7400), &cache), MatchResult::Added);
        assert!(registry.contains(guid(2)));
    }

    #[test]
    fn test_sender_resources_created_once() {
        let (transport, cache) = resources();
        let mut registry: MatchedReaderRegistry<ReaderLocatorEntry> =
            MatchedReaderRegistry::new(ReaderAllocation::default());

        let shared = Locator::udpv4(239, 255, 0, 1, 7401);
        let r1 = ReaderProxyData::new(guid(1)).with_multicast(shared);
        let r2 = ReaderProxyData::new(guid(2)).with_multicast(shared);
        registry.add(&r1, &cache);
        registry.add(&r2, &cache);

        assert_eq!(transport.sender_resources(), vec![shared]);
    }

    #[test]
    fn test_fixed_locators_included_in_send_set() {
        let (transport, cache) = resources();
        let mut registry: MatchedReaderRegistry<ReaderLocatorEntry> =
            MatchedReaderRegistry::new(ReaderAllocation::default());

        assert!(!registry.has_destinations());
        let fixed = Locator::udpv4(192, 168, 0, 5, 9999);
        registry.set_fixed_locators(vec![fixed], &cache);

        assert!(registry.has_destinations());
        assert_eq!(registry.send_locators(), vec![fixed]);
        assert_eq!(transport.sender_resources(), vec![fixed]);
    }
}
