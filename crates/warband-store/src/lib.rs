//! World store for the Warband battle engine.
//!
//! The world is one hierarchical keyed tree (chunks, players, events). The
//! engine reads it once per tick as a JSON value and writes back through
//! path-addressed [`UpdateBatch`]es, each committed all-or-nothing.
//!
//! ```text
//! Battle resolution
//!     |
//!     +-- UpdateBatch (path -> Set | Delete)
//!     |       |
//!     |       +-- into_plan(): drop writes under deletes, fold nested sets
//!     |
//!     +-- WorldStore::commit
//!             |-- MemoryStore     (swap-on-commit, tests and seed files)
//!             +-- DragonflyStore  (per-document keys, MULTI/EXEC)
//! ```
//!
//! # Modules
//!
//! - [`path`] -- Slash-separated tree paths
//! - [`tree`] -- Path reads and writes on a JSON tree
//! - [`batch`] -- [`UpdateBatch`] and the conflict pass
//! - [`layout`] -- Path builders for every record the engine touches
//! - [`memory`] -- In-process store
//! - [`dragonfly`] -- `Dragonfly` (Redis-compatible) store
//! - [`error`] -- Shared error types

use std::future::Future;

use serde_json::Value;

pub mod batch;
pub mod dragonfly;
pub mod error;
pub mod layout;
pub mod memory;
pub mod path;
pub mod tree;

// Re-export primary types for convenience.
pub use batch::{CommitPlan, Op, UpdateBatch};
pub use dragonfly::DragonflyStore;
pub use error::StoreError;
pub use memory::MemoryStore;
pub use path::Path;

/// Counters describing one applied commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitStats {
    /// Operations written after the conflict pass.
    pub applied: usize,
    /// Operations discarded because an ancestor was deleted.
    pub dropped: usize,
}

/// An atomic multi-path keyed store holding the world tree.
pub trait WorldStore: Send + Sync {
    /// Read the whole world tree.
    fn load_world(&self) -> impl Future<Output = Result<Value, StoreError>> + Send;

    /// Apply every operation in `batch`, or none of them.
    fn commit(
        &self,
        batch: UpdateBatch,
    ) -> impl Future<Output = Result<CommitStats, StoreError>> + Send;
}
