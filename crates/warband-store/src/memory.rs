//! In-process world store.
//!
//! Holds the tree behind a [`tokio::sync::RwLock`]. A commit applies its
//! plan to a copy and swaps it in, so readers never observe a half-applied
//! batch.

use std::path::Path as FsPath;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::batch::UpdateBatch;
use crate::error::StoreError;
use crate::{CommitStats, WorldStore};

/// A [`WorldStore`] backed by an in-memory JSON tree.
#[derive(Debug)]
pub struct MemoryStore {
    tree: RwLock<Value>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl MemoryStore {
    /// Wrap an existing world tree.
    pub const fn new(tree: Value) -> Self {
        Self {
            tree: RwLock::const_new(tree),
        }
    }

    /// Load a world tree from a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the file cannot be read and
    /// [`StoreError::Serialization`] if it is not valid JSON.
    pub fn from_json_file(path: impl AsRef<FsPath>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read seed file {}: {e}", path.display()))
        })?;
        let tree: Value = serde_json::from_str(&contents)?;
        Ok(Self::new(tree))
    }

    /// A copy of the current tree.
    pub async fn tree(&self) -> Value {
        self.tree.read().await.clone()
    }

    /// Write the current tree to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] if the file cannot be written.
    pub async fn write_json_file(&self, path: impl AsRef<FsPath>) -> Result<(), StoreError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&*self.tree.read().await)?;
        std::fs::write(path, json).map_err(|e| {
            StoreError::Config(format!("Failed to write world file {}: {e}", path.display()))
        })
    }
}

impl WorldStore for MemoryStore {
    async fn load_world(&self) -> Result<Value, StoreError> {
        Ok(self.tree().await)
    }

    async fn commit(&self, batch: UpdateBatch) -> Result<CommitStats, StoreError> {
        let plan = batch.into_plan();
        let stats = CommitStats {
            applied: plan.len(),
            dropped: plan.dropped,
        };
        if plan.is_empty() {
            return Ok(stats);
        }

        let mut guard = self.tree.write().await;
        let mut next = guard.clone();
        plan.apply_to(&mut next);
        *guard = next;
        drop(guard);

        debug!(applied = stats.applied, dropped = stats.dropped, "Committed batch");
        Ok(stats)
    }
}
