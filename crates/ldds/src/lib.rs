// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 ldds.dev

//! # LDDS - Lightweight DDS/RTPS publication engine
//!
//! A pure Rust implementation of the publication side of the RTPS
//! (Real-Time Publish-Subscribe) protocol: writer history, best-effort and
//! reliable delivery state machines, cooperative asynchronous sending, flow
//! control and the Writer Liveliness Protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ldds::{ChangeInput, Participant, ProtocolConfig, QosProfile, WriterOptions};
//! use ldds::transport::mem::MemTransport;
//!
//! fn main() -> ldds::Result<()> {
//!     let transport = Arc::new(MemTransport::new());
//!     let participant = Participant::new([1; 12], transport, ProtocolConfig::default());
//!
//!     let writer = participant
//!         .create_stateful_writer(&QosProfile::reliable(), WriterOptions::default())?;
//!     writer.write(ChangeInput::data(b"hello".to_vec()))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Embedding layer                             |
//! |      Discovery | Readers | Serialization of user types             |
//! +--------------------------------------------------------------------+
//! |                      Publication engines                           |
//! |  StatelessWriter (best-effort) | StatefulWriter (reliable)         |
//! |  HistoryCache | MatchedReaderRegistry | FlowControllers | WLP      |
//! +--------------------------------------------------------------------+
//! |            AsyncSender (worker pool, EDF scheduling)               |
//! +--------------------------------------------------------------------+
//! |              Transport contract (UDP/TCP/SHM outside)              |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Participant`] | Shared wiring and writer factory |
//! | [`writer::StatefulWriter`] | Reliable writer with per-reader state |
//! | [`writer::StatelessWriter`] | Best-effort fire-and-forget writer |
//! | [`history::WriterHistoryCache`] | Sample store with QoS-driven eviction |
//! | [`qos::QosProfile`] | Quality of Service configuration |
//!
//! ## See Also
//!
//! - [RTPS Specification](https://www.omg.org/spec/DDSI-RTPS/2.5/)
//! - [DDS Specification](https://www.omg.org/spec/DDS/1.4/)

/// Protocol timing and runtime configuration.
pub mod config;
/// Identifier and addressing primitives.
pub mod core;
/// Flow control over pending sends.
pub mod flow;
/// Writer-side sample history.
pub mod history;
/// Callback surface exposed to the embedding layer.
pub mod listener;
/// Writer Liveliness Protocol.
pub mod liveliness;
/// Participant wiring and inbound demultiplexing.
mod participant;
/// RTPS wire protocol layer.
pub mod protocol;
/// QoS (Quality of Service) policies.
pub mod qos;
/// Security plugin hooks.
pub mod security;
/// Cooperative asynchronous send scheduler.
pub mod sender;
/// Transport contract and in-memory test double.
pub mod transport;
/// Publication-side delivery engines.
pub mod writer;

pub use config::ProtocolConfig;
pub use history::{CacheChange, ChangeInput};
pub use listener::WriterListener;
pub use participant::{Participant, RemoteLivelinessHandler, WriterOptions};
pub use qos::QosProfile;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by LDDS operations.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// QoS policy is invalid (e.g., zero depth, conflicting policies).
    InvalidQos(String),

    // ========================================================================
    // Entity Errors
    // ========================================================================
    /// Invalid state for the requested operation.
    InvalidState(String),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Send operation failed.
    SendFailed(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Operation would block (e.g., KEEP_ALL history full).
    WouldBlock,
    /// Resource limit exceeded (history depth, matched readers, etc.).
    ResourceLimitExceeded(String),
    /// `max_blocking_time` expired during a send or lock acquisition.
    WriteTimeout,

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Security plugin refused a payload or message transformation.
    SecurityFailure(String),
    /// Requested feature or operation is not supported.
    Unsupported,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::WouldBlock => write!(f, "Operation would block"),
            Error::ResourceLimitExceeded(msg) => write!(f, "Resource limit exceeded: {}", msg),
            Error::WriteTimeout => write!(f, "Write timeout"),
            Error::SecurityFailure(msg) => write!(f, "Security failure: {}", msg),
            Error::Unsupported => write!(f, "Unsupported operation"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// LDDS version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
