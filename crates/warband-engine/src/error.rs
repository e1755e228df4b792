//! Error types for the battle engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the run itself.

/// Top-level error for the battle engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: warband_core::config::ConfigError,
    },

    /// Opening, seeding or writing back the world store failed.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: warband_store::StoreError,
    },

    /// The tick loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: warband_core::runner::RunnerError,
    },

    /// Log subscriber setup failed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },
}
