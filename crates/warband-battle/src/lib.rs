//! Battle resolution for the Warband world.
//!
//! Each world tick, every active battle advances by exactly one step:
//! fleeing groups withdraw, critical hits are rolled, both sides trade
//! attrition from the same pre-casualty state, the contested structure
//! takes damage, and the outcome state machine decides whether the battle
//! ends. All mutations for one battle go into a single
//! [`UpdateBatch`](warband_store::UpdateBatch), committed all-or-nothing.
//!
//! # Modules
//!
//! - [`locator`] -- Active battles and orphaned linkages
//! - [`resolve`] -- The per-battle pipeline
//! - [`power`] -- Unit, group, structure and side power
//! - [`attrition`] -- Casualty counts, stalemate guard and critical hits
//! - [`side`] -- Applying casualties to one side
//! - [`structure`] -- Structure damage, destruction and capture
//! - [`outcome`] -- Victory, draw and forced outcomes
//! - [`loot`] -- Pooling and delivering dropped items
//! - [`events`] -- Narrative text and the per-tick chronicle
//! - [`config`] -- Tunable constants
//! - [`error`] -- Error types

pub mod attrition;
pub mod config;
pub mod error;
pub mod events;
pub mod locator;
pub mod loot;
pub mod outcome;
pub mod power;
pub mod resolve;
pub mod side;
pub mod structure;

// Re-export primary types for convenience.
pub use config::BattleConfig;
pub use error::BattleError;
pub use locator::{BattleRef, Orphan, Scan, locate, repair_orphans};
pub use outcome::Outcome;
pub use power::SidePair;
pub use resolve::{BattleReport, Resolution, Scene, resolve_battle};
