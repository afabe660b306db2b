// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Security plugin hooks.
//!
//! Actual cryptography lives in an external plugin; the engines only call
//! these two transformation points. A failing hook keeps the affected change
//! out of the wire and out of the acknowledged set.

use crate::Result;

/// Payload/message protection hooks consumed by the publication pipeline.
pub trait SecurityPlugin: Send + Sync {
    /// Transform a serialized payload before it enters a submessage.
    fn encrypt_payload(&self, payload: &[u8]) -> Result<Vec<u8>>;

    /// Transform a complete RTPS message at flush time.
    fn protect_message(&self, message: &[u8]) -> Result<Vec<u8>>;
}
