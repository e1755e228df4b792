//! Enumeration types for world records.
//!
//! Status and kind strings arrive from many subsystems that each own part of
//! a record's state machine. Unknown values are captured by a catch-all
//! variant at ingestion instead of failing the whole tile, so the battle
//! engine can reset them to a safe default.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Who controls a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// A group owned by a player account.
    #[default]
    Player,
    /// A monster group (no owner).
    Monster,
}

/// Lifecycle status of a group.
///
/// Each non-battle status belongs to another tick processor; the battle
/// engine only reads `Fighting` and `Fleeing` and writes `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    /// Standing on its tile with no pending work.
    #[default]
    Idle,
    /// Travelling along a path.
    Moving,
    /// Harvesting tile resources.
    Gathering,
    /// Constructing a structure.
    Building,
    /// Disbanding back into the owner's structure.
    Demobilising,
    /// Linked to an active battle.
    Fighting,
    /// Leaving its battle at the next tick.
    Fleeing,
    /// Forming from a structure's garrison.
    Mobilizing,
    /// Cancelling an in-progress activity.
    Cancelling,
    /// Any status string this engine does not recognise.
    #[serde(other)]
    Unknown,
}

/// Which coalition a participant fights for.
///
/// Stored as the integer `1` or `2`. Ingestion also accepts the strings
/// `"1"`, `"2"`, `"side1"` and `"side2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BattleSide {
    /// The first side (usually the attacker).
    Side1,
    /// The second side (usually the defender).
    Side2,
}

impl BattleSide {
    /// The opposing side.
    pub const fn opponent(self) -> Self {
        match self {
            Self::Side1 => Self::Side2,
            Self::Side2 => Self::Side1,
        }
    }

    /// The numeric form written to the store.
    pub const fn number(self) -> u8 {
        match self {
            Self::Side1 => 1,
            Self::Side2 => 2,
        }
    }

    /// The record field name of this side on a battle (`side1` / `side2`).
    pub const fn field(self) -> &'static str {
        match self {
            Self::Side1 => "side1",
            Self::Side2 => "side2",
        }
    }
}

impl core::fmt::Display for BattleSide {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.field())
    }
}

impl Serialize for BattleSide {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

impl<'de> Deserialize<'de> for BattleSide {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(1) => Ok(Self::Side1),
            Raw::Number(2) => Ok(Self::Side2),
            Raw::Text(text) => match text.as_str() {
                "1" | "side1" => Ok(Self::Side1),
                "2" | "side2" => Ok(Self::Side2),
                other => Err(serde::de::Error::custom(format!("invalid battle side {other:?}"))),
            },
            Raw::Number(other) => Err(serde::de::Error::custom(format!(
                "invalid battle side {other}"
            ))),
        }
    }
}

/// The part a group plays inside its battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleRole {
    /// Started the engagement.
    #[default]
    Attacker,
    /// Was engaged on its own tile.
    Defender,
    /// Joined an engagement already in progress.
    #[serde(other)]
    Support,
}

// ---------------------------------------------------------------------------
// Battles
// ---------------------------------------------------------------------------

/// Entity classes contested in a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// Groups fight groups.
    Group,
    /// The tile's structure is under attack.
    Structure,
}

/// Lifecycle status of a battle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BattleStatus {
    /// Advanced once per tick.
    #[default]
    Active,
    /// Finished; awaiting deletion by its creator. Never advanced.
    #[serde(other)]
    Resolved,
}

/// Kinds of entries in a battle's own event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BattleEventKind {
    /// Casualties were inflicted this tick.
    #[default]
    Casualties,
    /// A group left the battle.
    Flee,
    /// A group was wiped out.
    GroupDestroyed,
    /// The stalemate guard forced a casualty.
    StalemateBreak,
    /// The tile's structure took damage.
    StructureDamaged,
    /// The tile's structure was destroyed.
    StructureDestroyed,
    /// A player unit landed a critical hit.
    CriticalHit,
    /// Any kind this engine does not recognise.
    #[serde(other)]
    Other,
}

// ---------------------------------------------------------------------------
// Structures
// ---------------------------------------------------------------------------

/// The type of a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureKind {
    /// A player's respawn point.
    Spawn,
    /// A temporary camp.
    Camp,
    /// A small outpost.
    Outpost,
    /// A settled village.
    Village,
    /// A walled stronghold.
    Stronghold,
    /// A fortress.
    Fortress,
    /// Any type this engine does not recognise.
    #[default]
    #[serde(other)]
    Unknown,
}

impl StructureKind {
    /// Maximum durability (full health) for this structure type.
    pub const fn max_durability(self) -> u32 {
        match self {
            Self::Spawn | Self::Stronghold => 500,
            Self::Camp | Self::Unknown => 100,
            Self::Outpost => 200,
            Self::Village => 300,
            Self::Fortress => 1000,
        }
    }

    /// Lowercase display name.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Spawn => "spawn",
            Self::Camp => "camp",
            Self::Outpost => "outpost",
            Self::Village => "village",
            Self::Stronghold => "stronghold",
            Self::Fortress => "fortress",
            Self::Unknown => "structure",
        }
    }
}
