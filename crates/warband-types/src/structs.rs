//! Core entity records: units, groups, structures, battles, players, items.
//!
//! Field names follow the camelCase JSON written by the rest of the game.
//! Optional fields stay optional; containers are normalized through
//! [`crate::ingest`] so every collection is a `BTreeMap` keyed by id.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::{
    BattleEventKind, BattleRole, BattleSide, BattleStatus, GroupKind, GroupStatus, StructureKind,
    TargetType,
};
use crate::ids::{BattleId, GroupId, ItemId, PlayerId, StructureId, UnitId};
use crate::ingest::{
    Keyed, id_set, keyed_map, lenient_count, lenient_list, lenient_opt, lenient_or_default, lenient_u32,
};

/// Number of tiles along one edge of a chunk.
pub const CHUNK_SIZE: i32 = 20;

/// Generates a [`Keyed`] impl for a record with an `id` field.
macro_rules! keyed_by_id {
    ($record:ty, $key:ty) => {
        impl Keyed for $record {
            type Key = $key;

            fn key(&self) -> &Self::Key {
                &self.id
            }

            fn assign_key(&mut self, key: Self::Key) {
                self.id = key;
            }

            fn fresh_key() -> Self::Key {
                <$key>::new()
            }

            fn key_is_empty(&self) -> bool {
                self.id.is_empty()
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    /// Column.
    pub x: i32,
    /// Row.
    pub y: i32,
}

impl Location {
    /// Create a location.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The tile key (`"x,y"`).
    pub fn tile_key(self) -> String {
        format!("{},{}", self.x, self.y)
    }

    /// The key of the chunk containing this tile (`"cx,cy"`).
    pub fn chunk_key(self) -> String {
        format!(
            "{},{}",
            self.x.div_euclid(CHUNK_SIZE),
            self.y.div_euclid(CHUNK_SIZE)
        )
    }

    /// Parse a tile key of the form `"x,y"`.
    pub fn parse_key(key: &str) -> Option<Self> {
        let (x, y) = key.split_once(',')?;
        Some(Self {
            x: x.trim().parse().ok()?,
            y: y.trim().parse().ok()?,
        })
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// An item in a group, structure, or tile container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Item id (the container key).
    #[serde(default)]
    pub id: ItemId,
    /// Item type key.
    #[serde(rename = "type", default)]
    pub item_type: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stack size.
    #[serde(default = "default_quantity", deserialize_with = "quantity")]
    pub quantity: u32,
    /// Rarity tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rarity: Option<String>,
}

keyed_by_id!(Item, ItemId);

const fn default_quantity() -> u32 {
    1
}

fn quantity<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(lenient_u32(deserializer)?.unwrap_or(1))
}

// ---------------------------------------------------------------------------
// Units & groups
// ---------------------------------------------------------------------------

/// A single combatant inside a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Unit id (the container key).
    #[serde(default)]
    pub id: UnitId,
    /// Species or unit type.
    #[serde(rename = "type", default)]
    pub unit_type: String,
    /// Display name (player units carry the player's name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Linked player account, if this unit is a player avatar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<PlayerId>,
    /// Combat strength; absent means 1.
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub strength: Option<u32>,
    /// Landed a critical hit this tick.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub critical_hit: bool,
    /// Landed critical hits on consecutive ticks.
    #[serde(default, skip_serializing_if = "core::ops::Not::not")]
    pub combo_critical: bool,
    /// The opposing unit this unit's critical hit landed on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<UnitId>,
}

keyed_by_id!(Unit, UnitId);

impl Unit {
    /// Whether this unit is a player avatar.
    pub const fn is_player(&self) -> bool {
        self.player.is_some()
    }

    /// Name shown in event text.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.unit_type)
    }
}

/// A mobile collection of units sharing position, owner, and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group id (the container key).
    #[serde(default)]
    pub id: GroupId,
    /// Owning player; `None` for monsters.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub owner: Option<PlayerId>,
    /// Display name.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub name: String,
    /// Player or monster.
    #[serde(rename = "type", default, deserialize_with = "lenient_or_default")]
    pub kind: GroupKind,
    /// Lifecycle status.
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub status: GroupStatus,
    /// Units in the group.
    #[serde(default, deserialize_with = "keyed_map")]
    pub units: BTreeMap<UnitId, Unit>,
    /// Carried items.
    #[serde(default, deserialize_with = "keyed_map")]
    pub items: BTreeMap<ItemId, Item>,
    /// Linked battle while fighting. Linkage fields of the wrong shape read
    /// as absent so the group stays visible to roster and orphan repair.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub battle_id: Option<BattleId>,
    /// Side within the linked battle.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub battle_side: Option<BattleSide>,
    /// Role within the linked battle.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub battle_role: Option<BattleRole>,
}

keyed_by_id!(Group, GroupId);

impl Group {
    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Player ids of every player unit in the group.
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.units.values().filter_map(|u| u.player.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// A stationary, ownable tile entity with durability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Structure {
    /// Structure id.
    #[serde(default)]
    pub id: StructureId,
    /// Structure type.
    #[serde(rename = "type", default)]
    pub kind: StructureKind,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<PlayerId>,
    /// Current health; absent means full durability.
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub health: Option<u32>,
    /// Stored items (bank).
    #[serde(default, deserialize_with = "keyed_map")]
    pub items: BTreeMap<ItemId, Item>,
    /// Status string owned by the building/upgrade processors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Linked battle.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub battle_id: Option<BattleId>,
    /// Side the structure defends.
    #[serde(default, deserialize_with = "lenient_opt", skip_serializing_if = "Option::is_none")]
    pub battle_side: Option<BattleSide>,
}

impl Structure {
    /// Maximum durability for this structure's type.
    pub const fn max_health(&self) -> u32 {
        self.kind.max_durability()
    }

    /// Current health clamped into `[0, max]`.
    pub fn current_health(&self) -> u32 {
        let max = self.max_health();
        self.health.map_or(max, |h| h.min(max))
    }

    /// Display name, falling back to the type label.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.kind.label()
        } else {
            &self.name
        }
    }
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

/// One coalition in a battle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleSideRecord {
    /// Display name for event text.
    #[serde(default)]
    pub name: String,
    /// Participating group ids.
    #[serde(default, deserialize_with = "id_set")]
    pub groups: BTreeSet<GroupId>,
    /// Cumulative casualties suffered.
    #[serde(default, deserialize_with = "lenient_count")]
    pub casualties: u32,
}

/// One entry of a battle's own event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleEvent {
    /// World tick the entry was written on.
    #[serde(default)]
    pub tick: u64,
    /// Entry kind.
    #[serde(rename = "type", default)]
    pub kind: BattleEventKind,
    /// Human-readable text.
    #[serde(default)]
    pub text: String,
}

/// A battle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battle {
    /// Battle id (the container key).
    #[serde(default)]
    pub id: BattleId,
    /// Tile of the battle; filled from the tile key at ingestion.
    #[serde(default)]
    pub location: Location,
    /// First coalition.
    #[serde(default)]
    pub side1: BattleSideRecord,
    /// Second coalition.
    #[serde(default)]
    pub side2: BattleSideRecord,
    /// Entity classes contested.
    #[serde(default = "default_target_types", deserialize_with = "target_types")]
    pub target_types: Vec<TargetType>,
    /// Ticks processed so far.
    #[serde(default, deserialize_with = "lenient_count")]
    pub tick_count: u32,
    /// Ordered battle log.
    #[serde(default, deserialize_with = "lenient_list")]
    pub events: Vec<BattleEvent>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: BattleStatus,
}

keyed_by_id!(Battle, BattleId);

impl Battle {
    /// The record of one side.
    pub const fn side(&self, side: BattleSide) -> &BattleSideRecord {
        match side {
            BattleSide::Side1 => &self.side1,
            BattleSide::Side2 => &self.side2,
        }
    }

    /// Mutable record of one side.
    pub const fn side_mut(&mut self, side: BattleSide) -> &mut BattleSideRecord {
        match side {
            BattleSide::Side1 => &mut self.side1,
            BattleSide::Side2 => &mut self.side2,
        }
    }

    /// Whether structures are contested in this battle.
    pub fn targets_structure(&self) -> bool {
        self.target_types.contains(&TargetType::Structure)
    }

    /// Which side a group is rostered on.
    pub fn side_of(&self, group: &GroupId) -> Option<BattleSide> {
        if self.side1.groups.contains(group) {
            Some(BattleSide::Side1)
        } else if self.side2.groups.contains(group) {
            Some(BattleSide::Side2)
        } else {
            None
        }
    }
}

fn default_target_types() -> Vec<TargetType> {
    vec![TargetType::Group]
}

fn target_types<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<TargetType>, D::Error> {
    let mut types: Vec<TargetType> = lenient_list(deserializer)?;
    types.sort();
    types.dedup();
    if types.is_empty() {
        types = default_target_types();
    }
    Ok(types)
}

// ---------------------------------------------------------------------------
// Players
// ---------------------------------------------------------------------------

/// A player standing on a tile outside any group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TilePlayer {
    /// Player id (the container key).
    #[serde(default)]
    pub id: PlayerId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

keyed_by_id!(TilePlayer, PlayerId);

/// A notification shown to a player on their next login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMessage {
    /// Message text.
    pub text: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}

/// The account-level player record in the `players/` namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// Player id (the container key).
    #[serde(default)]
    pub id: PlayerId,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Whether the player's avatar is alive.
    #[serde(default = "default_alive")]
    pub alive: bool,
    /// Where the player was last seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<Location>,
    /// Last notification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<PlayerMessage>,
    /// Backreference to the group the player is in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_group: Option<GroupId>,
}

keyed_by_id!(PlayerRecord, PlayerId);

const fn default_alive() -> bool {
    true
}

// ---------------------------------------------------------------------------
// World events
// ---------------------------------------------------------------------------

/// An entry in the world-scoped event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldEvent {
    /// Human-readable text.
    pub text: String,
    /// Always `"event"` for entries written by the battle engine.
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    /// Where it happened.
    pub location: Location,
}

impl WorldEvent {
    /// Build a battle event at `location`.
    pub fn new(text: impl Into<String>, timestamp: i64, location: Location) -> Self {
        Self {
            text: text.into(),
            kind: String::from("event"),
            timestamp,
            location,
        }
    }
}
