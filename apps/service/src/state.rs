//! Persisted per-target status, so that separate single-shot invocations only
//! alert on transitions.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StateError;

/// Last known status of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub is_up: bool,
    /// Unix timestamp (seconds) at which the current status was first seen
    pub last_change: i64,
}

impl StatusRecord {
    pub fn new(is_up: bool, last_change: i64) -> Self {
        Self { is_up, last_change }
    }
}

/// Target name -> last known status
pub type StateMap = BTreeMap<String, StatusRecord>;

/// Storage for the state carried between cycles
pub trait StateStore: Send + Sync {
    /// Load the previous state. A store that has never been saved yields an
    /// empty map.
    fn load(&self) -> Result<StateMap, StateError>;

    /// Replace the stored state with `state`.
    fn save(&self, state: &StateMap) -> Result<(), StateError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    targets: StateMap,
}

/// TOML file backed state store. Saves go through a temporary file in the same
/// directory that is renamed over the old one.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_err(&self, source: std::io::Error) -> StateError {
        StateError::Write { path: self.path.clone(), source }
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<StateMap, StateError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No state file yet, starting fresh");
                return Ok(StateMap::new());
            }
            Err(source) => return Err(StateError::Read { path: self.path.clone(), source }),
        };

        let file: StateFile = toml::from_str(&raw)
            .map_err(|source| StateError::Parse { path: self.path.clone(), source })?;
        Ok(file.targets)
    }

    fn save(&self, state: &StateMap) -> Result<(), StateError> {
        let file = StateFile { targets: state.clone() };
        let contents = toml::to_string_pretty(&file)?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.write_err(e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_err(e))?;
        tmp.write_all(contents.as_bytes()).map_err(|e| self.write_err(e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(e.error))?;

        debug!(path = %self.path.display(), targets = state.len(), "Saved state");
        Ok(())
    }
}
