//! Virtual file system
//!
//! An in-memory file tree keyed by absolute path strings. Mutations fire
//! semantic events so scenarios can react to file activity.

use dashmap::DashMap;
use sd_core::Context;
use sd_event_bus::EventBus;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// VFS event names
pub mod events {
    pub const FILE_CREATED: &str = "fs:created";
    pub const FILE_WRITTEN: &str = "fs:written";
    pub const FILE_DELETED: &str = "fs:deleted";
}

/// Virtual file system errors
#[derive(Debug, Error)]
pub enum VfsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),
}

/// Result type for VFS operations
pub type VfsResult<T> = Result<T, VfsError>;

/// The virtual file system
pub struct VirtualFs {
    files: DashMap<String, String>,
    event_bus: Arc<EventBus>,
}

impl VirtualFs {
    /// Create an empty file system
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            files: DashMap::new(),
            event_bus,
        }
    }

    /// Check whether a file exists
    pub fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Read a file's contents
    pub fn read(&self, path: &str) -> VfsResult<String> {
        self.files
            .get(path)
            .map(|f| f.value().clone())
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    /// Create a new file; fails if the path is taken
    pub fn create(&self, path: &str, content: impl Into<String>) -> VfsResult<()> {
        if self.files.contains_key(path) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        self.files.insert(path.to_string(), content.into());

        debug!(path, "File created");
        self.event_bus
            .publish_named(events::FILE_CREATED, json!({"path": path}), Context::new());
        Ok(())
    }

    /// Write a file, creating or replacing it
    pub fn write(&self, path: &str, content: impl Into<String>) {
        let created = !self.files.contains_key(path);
        self.files.insert(path.to_string(), content.into());

        debug!(path, created, "File written");
        let name = if created {
            events::FILE_CREATED
        } else {
            events::FILE_WRITTEN
        };
        self.event_bus
            .publish_named(name, json!({"path": path}), Context::new());
    }

    /// Append to a file, creating it if missing
    pub fn append(&self, path: &str, content: &str) {
        let created = !self.files.contains_key(path);
        self.files
            .entry(path.to_string())
            .or_default()
            .push_str(content);

        debug!(path, "File appended");
        let name = if created {
            events::FILE_CREATED
        } else {
            events::FILE_WRITTEN
        };
        self.event_bus
            .publish_named(name, json!({"path": path}), Context::new());
    }

    /// Delete a file
    pub fn delete(&self, path: &str) -> VfsResult<()> {
        self.files
            .remove(path)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))?;

        debug!(path, "File deleted");
        self.event_bus
            .publish_named(events::FILE_DELETED, json!({"path": path}), Context::new());
        Ok(())
    }

    /// List paths under a directory prefix
    pub fn list(&self, dir: &str) -> Vec<String> {
        let prefix = if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{}/", dir)
        };
        let mut paths: Vec<String> = self
            .files
            .iter()
            .filter(|f| f.key().starts_with(&prefix))
            .map(|f| f.key().clone())
            .collect();
        paths.sort();
        paths
    }
}
