// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

/// LIVELINESS QoS kinds (DDS v1.4 Sec.2.2.3.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LivelinessKind {
    /// The middleware asserts liveliness on the writer's behalf.
    #[default]
    Automatic,
    /// Application must assert once per participant lease.
    ManualByParticipant,
    /// Application must assert per writer/topic.
    ManualByTopic,
}
