// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! Writer-side sample history.

mod cache;

pub use cache::{CacheChange, ChangeInput, HistoryAttributes, WriterHistoryCache};
