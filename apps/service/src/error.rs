use std::io::Error as IoError;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading the configuration file. All of them are fatal
/// at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {}: {source}", path.display())]
    Read { path: PathBuf, source: ini::Error },
    #[error("invalid configuration syntax: {0}")]
    Parse(#[from] ini::ParseError),
    #[error("section [{section}] is missing the required `{key}` key")]
    MissingKey { section: String, key: &'static str },
    #[error("target [{0}] is defined more than once")]
    DuplicateTarget(String),
    #[error("invalid value {value:?} for setting `{key}`: {reason}")]
    InvalidSetting { key: String, value: String, reason: String },
}

/// Errors raised by the state store. The monitor logs them and carries on.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state file {}: {source}", path.display())]
    Read { path: PathBuf, source: IoError },
    #[error("failed to write state file {}: {source}", path.display())]
    Write { path: PathBuf, source: IoError },
    #[error("corrupt state file {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Per-target errors. A target hitting one of these is skipped for the
/// current cycle, the others still run.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no check strategy registered under `{0}`")]
    UnknownCheck(String),
    #[error("no alert strategy registered under `{0}`")]
    UnknownAlert(String),
    #[error("invalid value {value:?} for option `{key}`: {reason}")]
    InvalidOption { key: String, value: String, reason: String },
    #[error("{0}")]
    Strategy(String),
}
