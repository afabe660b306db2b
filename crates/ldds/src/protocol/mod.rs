// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! RTPS wire protocol layer.

/// RTPS submessage encoders/decoders and number-set types.
pub mod rtps;
