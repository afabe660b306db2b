// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Pending-send work list handed to flow controllers.
//!
//! The engines fill a collector with the (sequence number, fragment, reader)
//! triples they want on the wire; controllers reshape it in place; the send
//! loop drains what survives. Items stay sorted by (sequence number,
//! fragment number) so dispatch order is always monotonic per destination.

use crate::core::types::{FragmentNumber, Guid, SequenceNumber};

/// One unit of pending send work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorItem {
    pub sequence_number: SequenceNumber,
    /// 0 = the whole change; otherwise a single fragment.
    pub fragment_number: FragmentNumber,
    /// Restrict the send to one reader (`None` = all selected).
    pub reader_guid: Option<Guid>,
    /// Payload bytes this item will put on the wire.
    pub size_bytes: usize,
}

/// Ordered, deduplicated list of pending send items.
#[derive(Debug, Default)]
pub struct Collector {
    items: Vec<CollectorItem>,
}

impl Collector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a whole change.
    pub fn add_change(
        &mut self,
        sequence_number: SequenceNumber,
        reader_guid: Option<Guid>,
        size_bytes: usize,
    ) {
        self.push(CollectorItem {
            sequence_number,
            fragment_number: 0,
            reader_guid,
            size_bytes,
        });
    }

    /// Queue a single fragment of a change.
    pub fn add_fragment(
        &mut self,
        sequence_number: SequenceNumber,
        fragment_number: FragmentNumber,
        reader_guid: Option<Guid>,
        size_bytes: usize,
    ) {
        self.push(CollectorItem {
            sequence_number,
            fragment_number,
            reader_guid,
            size_bytes,
        });
    }

    /// Insert keeping (sn, fragment) order; duplicates are dropped.
    pub fn push(&mut self, item: CollectorItem) {
        let key = (item.sequence_number, item.fragment_number, item.reader_guid);
        let pos = self
            .items
            .partition_point(|i| (i.sequence_number, i.fragment_number) <= (item.sequence_number, item.fragment_number));
        if self
            .items
            .iter()
            .any(|i| (i.sequence_number, i.fragment_number, i.reader_guid) == key)
        {
            return;
        }
        self.items.insert(pos, item);
    }

    /// Take the next item to send.
    pub fn pop(&mut self) -> Option<CollectorItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Read-only view for controllers sizing their budgets.
    #[must_use]
    pub fn items(&self) -> &[CollectorItem] {
        &self.items
    }

    /// Keep only items matching the predicate (controller dropping/deferring).
    pub fn retain(&mut self, pred: impl FnMut(&CollectorItem) -> bool) {
        self.items.retain(pred);
    }

    /// Defer everything from index `len` on; returns how many were cut.
    pub fn truncate(&mut self, len: usize) -> usize {
        let cut = self.items.len().saturating_sub(len);
        self.items.truncate(len);
        cut
    }

    /// Total payload bytes currently queued.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.items.iter().map(|i| i.size_bytes).sum()
    }
}
