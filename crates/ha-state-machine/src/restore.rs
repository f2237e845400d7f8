//! Restore-state cache
//!
//! Entities record their last written state here so it can be offered back
//! to them after a restart. The cache is persisted in the `.storage/`
//! directory of the config dir as a versioned JSON file.

use dashmap::DashMap;
use ha_core::State;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

/// Storage key (file name under `.storage/`)
pub const STORAGE_KEY: &str = "core.restore_state";

const STORAGE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported restore state version {found}, expected {expected}")]
    VersionMismatch { expected: u32, found: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
struct RestoreFile {
    version: u32,
    key: String,
    data: Vec<State>,
}

/// Last known state per entity
#[derive(Debug, Default)]
pub struct RestoreStateStore {
    states: DashMap<String, State>,
}

impl RestoreStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the restore file for a config directory
    pub fn file_path(config_dir: impl AsRef<Path>) -> PathBuf {
        config_dir.as_ref().join(".storage").join(STORAGE_KEY)
    }

    /// Remember `state` as the last state of its entity
    pub fn record(&self, state: &State) {
        self.states
            .insert(state.entity_id.to_string(), state.clone());
    }

    /// The last recorded state of an entity, if any
    pub fn last_state(&self, entity_id: &str) -> Option<State> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Write all recorded states to `<config_dir>/.storage/core.restore_state`
    ///
    /// Writes to a temp file first, then renames over the target.
    pub async fn save_to(&self, config_dir: impl AsRef<Path>) -> Result<(), RestoreError> {
        let path = Self::file_path(&config_dir);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut data: Vec<State> = self.states.iter().map(|r| r.value().clone()).collect();
        data.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));

        let file = RestoreFile {
            version: STORAGE_VERSION,
            key: STORAGE_KEY.to_string(),
            data,
        };
        let content = serde_json::to_string_pretty(&file)?;

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(count = file.data.len(), path = ?path, "Saved restore state");
        Ok(())
    }

    /// Load a store from `<config_dir>/.storage/core.restore_state`
    ///
    /// A missing file yields an empty store.
    pub async fn load_from(config_dir: impl AsRef<Path>) -> Result<Self, RestoreError> {
        let path = Self::file_path(&config_dir);
        let store = Self::new();

        if !path.exists() {
            debug!(path = ?path, "No restore state found");
            return Ok(store);
        }

        let content = fs::read_to_string(&path).await?;
        let file: RestoreFile = serde_json::from_str(&content)?;
        if file.version != STORAGE_VERSION {
            return Err(RestoreError::VersionMismatch {
                expected: STORAGE_VERSION,
                found: file.version,
            });
        }

        for state in &file.data {
            store.record(state);
        }

        info!(count = store.len(), "Loaded restore state");
        Ok(store)
    }
}
