// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Deduplicating fan-out selector.
//!
//! Keeps one entry per matched reader and yields the union of the enabled
//! entries' locators without duplicates, so a multicast group shared by many
//! readers is hit once per message instead of once per reader.

use crate::core::types::{Guid, Locator};

#[derive(Debug, Clone)]
struct SelectorEntry {
    guid: Guid,
    unicast: Vec<Locator>,
    multicast: Vec<Locator>,
    enabled: bool,
}

/// Per-writer locator selection state.
#[derive(Debug, Default)]
pub struct LocatorSelector {
    entries: Vec<SelectorEntry>,
}

impl LocatorSelector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or insert the entry for `guid`. New entries start enabled.
    pub fn add_entry(&mut self, guid: Guid, unicast: Vec<Locator>, multicast: Vec<Locator>) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.guid == guid) {
            entry.unicast = unicast;
            entry.multicast = multicast;
        } else {
            self.entries.push(SelectorEntry {
                guid,
                unicast,
                multicast,
                enabled: true,
            });
        }
    }

    pub fn remove_entry(&mut self, guid: Guid) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.guid != guid);
        self.entries.len() != before
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Re-enable every entry (the default fan-out).
    pub fn enable_all(&mut self) {
        for entry in &mut self.entries {
            entry.enabled = true;
        }
    }

    /// Narrow the selection to the given readers for the next send.
    pub fn select_only(&mut self, guids: &[Guid]) {
        for entry in &mut self.entries {
            entry.enabled = guids.contains(&entry.guid);
        }
    }

    /// Number of currently selected readers.
    #[must_use]
    pub fn selected_count(&self) -> usize {
        self.entries.iter().filter(|e| e.enabled).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deduplicated union of the selected entries' locators, multicast
    /// first so shared groups absorb the fan-out early.
    #[must_use]
    pub fn selected_locators(&self) -> Vec<Locator> {
        let mut locators: Vec<Locator> = Vec::new();
        for entry in self.entries.iter().filter(|e| e.enabled) {
            for locator in &entry.multicast {
                if !locators.contains(locator) {
                    locators.push(*locator);
                }
            }
        }
        for entry in self.entries.iter().filter(|e| e.enabled) {
            for locator in &entry.unicast {
                if !locators.contains(locator) {
                    locators.push(*locator);
                }
            }
        }
        locators
    }

    /// Whether any selected entry expects data at `locator`.
    #[must_use]
    pub fn covers(&self, locator: &Locator) -> bool {
        self.entries.iter().filter(|e| e.enabled).any(|e| {
            e.unicast.contains(locator) || e.multicast.contains(locator)
        })
    }
}
