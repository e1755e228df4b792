//! Error types for the store layer.
//!
//! All errors are propagated via [`StoreError`] which wraps the underlying
//! [`fred`] and [`serde_json`] errors with context about which operation
//! failed.

/// Errors that can occur in the store layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A path string could not be parsed.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A commit was rejected as a whole.
    #[error("Commit rejected: {0}")]
    CommitRejected(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
