//! Lightweight host monitoring.
//!
//! Targets from an INI file are checked one after another with a named check
//! strategy. When a target's status differs from the one persisted by the
//! previous cycle, its named alert strategy is invoked.

pub mod alerts;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod orchestrator;
pub mod state;

pub use config::{Settings, TargetDefinition, WatcherConfig};
pub use error::{ConfigError, StateError, WatchError};
pub use orchestrator::{CycleReport, Monitor};
pub use state::{FileStateStore, StateStore};
