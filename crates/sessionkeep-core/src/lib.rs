//! sessionkeep-core: Core library for sessionkeep
//!
//! Captures the tab/window topology of a kitty workspace, persists it per
//! project session, and replays it when the project is opened again.
//!
//! # Architecture
//!
//! ```text
//! terminal events → ChangeWatcher → SessionIdentifier
//!                         ↓
//!     kitty @ ls → SnapshotExtractor → TopologyModel → SessionStore
//!                                                          ↓
//!                   sk open <dir> → Sessionizer → ReplayEngine → kitty @ launch
//! ```
//!
//! # Modules
//!
//! - `topology`: Normalized session model and validation
//! - `snapshot`: Introspection payload decoding and normalization
//! - `store`: Session persistence (SQLite or JSON document)
//! - `controller`: Workspace controller trait and recording mock
//! - `kitty`: `kitty @` remote-control adapter
//! - `identify`: Session identification for live windows
//! - `replay`: Ordered topology replay
//! - `watcher`: Event-driven snapshot refresh
//! - `sessionizer`: Project picking and open-or-create
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//! - `error`: Error types with remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod config;
pub mod controller;
pub mod error;
pub mod identify;
pub mod kitty;
pub mod logging;
pub mod replay;
pub mod sessionizer;
pub mod snapshot;
pub mod store;
pub mod topology;
pub mod watcher;

pub use error::{Error, Result};

/// Version of the sessionkeep-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
