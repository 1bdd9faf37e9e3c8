//! Persisted build state: output path -> `{hashes, mtime}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lb_core::error::BuildError;
use lb_core::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredHashes {
    pub command: String,
    pub inputs: String,
    pub params: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredStepState {
    pub hashes: StoredHashes,
    pub mtime: f64,
}

pub type BuildState = HashMap<String, StoredStepState>;

/// Owns the on-disk state file. `load` never fails: a missing or malformed file is treated as an
/// empty map, which forces a full rebuild. `save` surfaces write failures.
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> BuildState {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|err| {
                tracing::warn!(path = %self.path.display(), error = %err, "malformed build state, starting fresh");
                BuildState::new()
            }),
            Err(_) => BuildState::new(),
        }
    }

    pub fn save(&self, state: &BuildState) -> Result<()> {
        let text = serde_json::to_string_pretty(state).expect("state must be JSON-serializable");
        std::fs::write(&self.path, text).map_err(|source| BuildError::StateWrite {
            path: self.path.display().to_string(),
            source,
        })
    }
}
