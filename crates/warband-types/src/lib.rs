//! Shared record types for the Warband world.
//!
//! This crate is the single source of truth for the shapes the battle engine
//! reads from and writes to the world store, and the ingestion boundary
//! where loosely-shaped records are normalized.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe wrappers for store keys
//! - [`enums`] -- Statuses, sides, roles, target and structure kinds
//! - [`structs`] -- Units, groups, structures, battles, players, items, events
//! - [`ingest`] -- Array-or-object container normalization
//! - [`snapshot`] -- [`WorldSnapshot`] and [`Tile`] parsed from the store tree

pub mod enums;
pub mod ids;
pub mod ingest;
pub mod snapshot;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    BattleEventKind, BattleRole, BattleSide, BattleStatus, GroupKind, GroupStatus, StructureKind,
    TargetType,
};
pub use ids::{BattleId, EventId, GroupId, ItemId, PlayerId, StructureId, UnitId};
pub use snapshot::{Tile, WorldSnapshot};
pub use structs::{
    Battle, BattleEvent, BattleSideRecord, CHUNK_SIZE, Group, Item, Location, PlayerMessage,
    PlayerRecord, Structure, TilePlayer, Unit, WorldEvent,
};
