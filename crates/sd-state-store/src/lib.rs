//! Durable key-path state storage for SimDesk
//!
//! This crate provides the StateStore, a single JSON document addressed
//! with dot-notation paths (`scenarios.intro.completed`). The scenario
//! engine uses it to persist completion flags and saved variables across
//! sessions. Persistence follows the `.storage/` pattern: a versioned
//! JSON file written atomically via temp file + rename.

use sd_core::{path, Context};
use sd_event_bus::EventBus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Event fired when a stored value changes
pub const STATE_CHANGED: &str = "state:changed";

/// Current storage format version
const STORAGE_VERSION: u32 = 1;

/// Storage file name inside the `.storage/` directory
const STORAGE_KEY: &str = "simdesk.state";

/// Storage errors
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Result type for state store operations
pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// On-disk wrapper with version tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StorageFile {
    version: u32,
    key: String,
    data: Value,
}

/// The durable key-path state store
///
/// Values live in one JSON document guarded by a RwLock; lock scopes are
/// short and never cross awaits. Mutations fire `state:changed` events.
pub struct StateStore {
    doc: RwLock<Value>,
    storage_dir: PathBuf,
    event_bus: Arc<EventBus>,
}

impl StateStore {
    /// Create an empty store persisting under `config_dir/.storage/`
    pub fn new(config_dir: impl AsRef<Path>, event_bus: Arc<EventBus>) -> Self {
        Self {
            doc: RwLock::new(json!({})),
            storage_dir: config_dir.as_ref().join(".storage"),
            event_bus,
        }
    }

    /// Get the value at a path
    pub fn get(&self, key_path: &str) -> Option<Value> {
        let doc = self.doc.read().expect("state store lock poisoned");
        path::resolve(&doc, key_path).cloned()
    }

    /// Set the value at a path, creating intermediate objects
    pub fn set(&self, key_path: &str, value: Value) -> StateStoreResult<()> {
        let old_value = {
            let mut doc = self.doc.write().expect("state store lock poisoned");
            let old = path::resolve(&doc, key_path).cloned();
            if !path::set(&mut doc, key_path, value.clone()) {
                return Err(StateStoreError::InvalidPath(key_path.to_string()));
            }
            old
        };

        debug!(path = key_path, "State value set");
        self.event_bus.publish_named(
            STATE_CHANGED,
            json!({"path": key_path, "oldValue": old_value, "newValue": value}),
            Context::new(),
        );
        Ok(())
    }

    /// Delete the value at a path
    ///
    /// Returns the removed value if the path resolved.
    pub fn delete(&self, key_path: &str) -> Option<Value> {
        let removed = {
            let mut doc = self.doc.write().expect("state store lock poisoned");
            path::remove(&mut doc, key_path)
        };

        if let Some(old) = &removed {
            debug!(path = key_path, "State value deleted");
            self.event_bus.publish_named(
                STATE_CHANGED,
                json!({"path": key_path, "oldValue": old, "newValue": Value::Null}),
                Context::new(),
            );
        }
        removed
    }

    /// Snapshot the whole document
    pub fn snapshot(&self) -> Value {
        self.doc.read().expect("state store lock poisoned").clone()
    }

    /// Persist the document atomically
    pub async fn persist(&self) -> StateStoreResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }

        let file = StorageFile {
            version: STORAGE_VERSION,
            key: STORAGE_KEY.to_string(),
            data: self.snapshot(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let final_path = self.storage_dir.join(STORAGE_KEY);
        let temp_path = self.storage_dir.join(format!("{}.tmp", STORAGE_KEY));

        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &final_path).await?;

        debug!("Persisted state store (v{})", STORAGE_VERSION);
        Ok(())
    }

    /// Load the document from disk, replacing the in-memory contents
    ///
    /// A missing file leaves the store empty; a corrupt or future-versioned
    /// file is an error.
    pub async fn load(&self) -> StateStoreResult<()> {
        let final_path = self.storage_dir.join(STORAGE_KEY);
        if !final_path.exists() {
            debug!("No persisted state found, starting empty");
            return Ok(());
        }

        let content = fs::read_to_string(&final_path).await?;
        let file: StorageFile = serde_json::from_str(&content)?;

        if file.version != STORAGE_VERSION {
            warn!(
                found = file.version,
                expected = STORAGE_VERSION,
                "State store version mismatch"
            );
            return Err(StateStoreError::VersionMismatch {
                expected: STORAGE_VERSION,
                found: file.version,
            });
        }

        *self.doc.write().expect("state store lock poisoned") = file.data;
        debug!("Loaded persisted state");
        Ok(())
    }
}
