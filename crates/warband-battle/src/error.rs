//! Error types for battle resolution.
//!
//! Errors are contained per battle. The tick phase maps each variant onto
//! its summary counters: [`BattleError::MissingRecord`] is a skip, every
//! other variant an error. Malformed-but-recoverable records never surface
//! here; they are repaired in place and logged.

use warband_store::StoreError;
use warband_types::{BattleId, Location};

/// Errors that can occur while resolving one battle.
#[derive(Debug, thiserror::Error)]
pub enum BattleError {
    /// The battle or its tile disappeared before resolution.
    #[error("battle {battle_id} at {location} is gone: {reason}")]
    MissingRecord {
        /// The battle that was looked up.
        battle_id: BattleId,
        /// Where it was expected.
        location: Location,
        /// What was missing.
        reason: &'static str,
    },

    /// Combat math produced a non-finite or out-of-range value.
    #[error("computation failed in battle {battle_id}: {context}")]
    Computation {
        /// The affected battle.
        battle_id: BattleId,
        /// Description of what was being computed.
        context: String,
    },

    /// A mutation could not be recorded.
    #[error("failed to record update: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

impl BattleError {
    /// Whether the battle should be counted as skipped rather than errored.
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::MissingRecord { .. })
    }
}
