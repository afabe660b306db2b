// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Callback surface exposed to the embedding layer.
//!
//! All methods have empty defaults so implementors only override what they
//! care about. Callbacks fire outside the writer lock; re-entering writer
//! APIs from a callback is safe.

use crate::core::types::{Guid, SequenceNumber};

/// Writer-side events.
pub trait WriterListener: Send + Sync {
    /// A change has been delivered as far as its reliability level promises:
    /// dispatched (best-effort) or acknowledged by every matched reader
    /// (reliable). Fires exactly once per change.
    fn on_writer_change_received_by_all(&self, writer_guid: Guid, sn: SequenceNumber) {
        let _ = (writer_guid, sn);
    }

    /// The writer failed to assert liveliness within its lease.
    fn on_liveliness_lost(&self, writer_guid: Guid) {
        let _ = writer_guid;
    }

    /// A lost writer asserted liveliness again.
    fn on_liveliness_recovered(&self, writer_guid: Guid) {
        let _ = writer_guid;
    }
}
