//! File-based queue snapshot — lightweight persistence.
//! The whole task map is written as one JSON file on mutation and read once
//! at startup. Last write wins; the in-memory queue stays authoritative.

use std::path::{Path, PathBuf};

use crate::task::Task;

/// Snapshot store for the task queue.
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    /// Create a store writing to `<dir>/tasks.json`.
    pub fn new(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        Self {
            path: dir.join("tasks.json"),
        }
    }

    /// Write the snapshot. Failures are logged, not fatal — the queue keeps
    /// serving from memory.
    pub fn save(&self, tasks: &[&Task]) {
        match serde_json::to_string_pretty(tasks) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.path, json) {
                    tracing::warn!("⚠️ Failed to write {}: {e}", self.path.display());
                }
            }
            Err(e) => tracing::warn!("⚠️ Failed to serialize task snapshot: {e}"),
        }
    }

    /// Load the snapshot. A missing file is an empty queue; a corrupt file
    /// is treated the same, with a warning.
    pub fn load(&self) -> Vec<Task> {
        if !self.path.exists() {
            return Vec::new();
        }
        match std::fs::read_to_string(&self.path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", self.path.display());
                Vec::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", self.path.display());
                Vec::new()
            }
        }
    }
}
