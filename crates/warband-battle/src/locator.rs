//! Finding battles to advance, and battle linkages that point nowhere.
//!
//! A group (or structure) can be left linked to a battle that no longer
//! exists, e.g. when an earlier commit deleted the battle but the entity was
//! written concurrently by another subsystem. Such linkages are repaired
//! each tick: the group returns to idle and its linkage is cleared. Group
//! records too malformed to read get the same reset when they still claim
//! a battle.

use tracing::warn;

use warband_store::{UpdateBatch, layout};
use warband_types::{BattleId, BattleStatus, GroupId, GroupStatus, Location, Tile, WorldSnapshot};

use crate::error::BattleError;

/// An active battle and where it is.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BattleRef {
    /// Tile of the battle.
    pub location: Location,
    /// The battle.
    pub battle_id: BattleId,
}

/// A linkage to a battle that does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Orphan {
    /// A group still marked as fighting.
    Group {
        /// Tile of the group.
        location: Location,
        /// The group.
        group_id: GroupId,
        /// The battle it claims to be in.
        battle_id: Option<BattleId>,
    },
    /// A group record that cannot be read but is marked as fighting.
    Unreadable {
        /// Tile of the group.
        location: Location,
        /// The group.
        group_id: GroupId,
    },
    /// A structure still linked to a battle.
    Structure {
        /// Tile of the structure.
        location: Location,
        /// The battle it claims to defend in.
        battle_id: BattleId,
    },
}

/// Everything the locator found in one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    /// Active battles, in location order.
    pub battles: Vec<BattleRef>,
    /// Dangling linkages.
    pub orphans: Vec<Orphan>,
}

fn rostered(tile: &Tile, group: &GroupId) -> bool {
    tile.battles
        .values()
        .any(|b| b.status == BattleStatus::Active && b.side_of(group).is_some())
}

fn is_live(tile: &Tile, battle: &BattleId) -> bool {
    tile.battles
        .get(battle)
        .is_some_and(|b| b.status == BattleStatus::Active)
}

/// Scan the world for active battles and orphaned linkages.
pub fn locate(snapshot: &WorldSnapshot) -> Scan {
    let mut scan = Scan::default();
    for tile in snapshot.tiles.values() {
        for battle in tile.battles.values() {
            if battle.status == BattleStatus::Active {
                scan.battles.push(BattleRef {
                    location: tile.location,
                    battle_id: battle.id.clone(),
                });
            }
        }

        for group in tile.groups.values() {
            let dangling = match &group.battle_id {
                Some(battle_id) => !is_live(tile, battle_id),
                None => group.status == GroupStatus::Fighting && !rostered(tile, &group.id),
            };
            if dangling {
                scan.orphans.push(Orphan::Group {
                    location: tile.location,
                    group_id: group.id.clone(),
                    battle_id: group.battle_id.clone(),
                });
            }
        }

        for group_id in &tile.stranded_groups {
            scan.orphans.push(Orphan::Unreadable {
                location: tile.location,
                group_id: group_id.clone(),
            });
        }

        let dangling_structure = tile
            .structure
            .as_ref()
            .and_then(|s| s.battle_id.as_ref())
            .filter(|id| !is_live(tile, id));
        if let Some(battle_id) = dangling_structure {
            scan.orphans.push(Orphan::Structure {
                location: tile.location,
                battle_id: battle_id.clone(),
            });
        }
    }
    scan
}

fn reset_group(tile: &Tile, group_id: &GroupId, batch: &mut UpdateBatch) -> Result<(), BattleError> {
    batch.set(layout::group_field(tile, group_id, "status"), &GroupStatus::Idle)?;
    for field in ["battleId", "battleSide", "battleRole"] {
        batch.delete(layout::group_field(tile, group_id, field));
    }
    Ok(())
}

/// Writes that clear every orphaned linkage in `scan`.
pub fn repair_orphans(snapshot: &WorldSnapshot, scan: &Scan) -> Result<UpdateBatch, BattleError> {
    let mut batch = UpdateBatch::new();
    for orphan in &scan.orphans {
        match orphan {
            Orphan::Group {
                location,
                group_id,
                battle_id,
            } => {
                let Some(tile) = snapshot.tile(*location) else {
                    continue;
                };
                warn!(
                    x = location.x,
                    y = location.y,
                    group_id = %group_id,
                    battle_id = battle_id.as_ref().map_or("", BattleId::as_str),
                    "Group linked to a missing battle, resetting to idle"
                );
                reset_group(tile, group_id, &mut batch)?;
            }
            Orphan::Unreadable { location, group_id } => {
                let Some(tile) = snapshot.tile(*location) else {
                    continue;
                };
                warn!(
                    x = location.x,
                    y = location.y,
                    group_id = %group_id,
                    "Unreadable group marked as fighting, resetting to idle"
                );
                reset_group(tile, group_id, &mut batch)?;
            }
            Orphan::Structure {
                location,
                battle_id,
            } => {
                let Some(tile) = snapshot.tile(*location) else {
                    continue;
                };
                warn!(
                    x = location.x,
                    y = location.y,
                    battle_id = %battle_id,
                    "Structure linked to a missing battle, clearing linkage"
                );
                batch.delete(layout::structure_field(tile, "battleId"));
                batch.delete(layout::structure_field(tile, "battleSide"));
            }
        }
    }
    Ok(batch)
}
