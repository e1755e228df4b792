//! Read-only world snapshot assembled from the store's JSON tree.
//!
//! The snapshot is the ingestion boundary: every tile, group, structure and
//! battle is parsed here exactly once. A record that fails to parse is
//! skipped with a warning; the rest of its tile (and the rest of the world)
//! is still usable.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::ids::{BattleId, GroupId, ItemId, PlayerId};
use crate::ingest::{Rejected, collect_keyed, keyed_map, partition_keyed};
use crate::structs::{Battle, Group, Item, Location, PlayerRecord, Structure, TilePlayer};

/// One tile and everything standing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Tile coordinate.
    pub location: Location,
    /// Chunk key the tile was read from.
    pub chunk_key: String,
    /// Tile key the tile was read from.
    pub tile_key: String,
    /// Groups on the tile.
    pub groups: BTreeMap<GroupId, Group>,
    /// Keys of group records that could not be parsed but still claim a
    /// battle linkage.
    pub stranded_groups: BTreeSet<GroupId>,
    /// The tile's structure, if any.
    pub structure: Option<Structure>,
    /// Battles on the tile.
    pub battles: BTreeMap<BattleId, Battle>,
    /// Standalone players on the tile.
    pub players: BTreeMap<PlayerId, TilePlayer>,
    /// Unowned treasure lying on the tile.
    pub items: BTreeMap<ItemId, Item>,
}

#[derive(Deserialize)]
struct RawTile {
    #[serde(default)]
    groups: Option<Value>,
    #[serde(default)]
    structure: Option<Value>,
    #[serde(default, deserialize_with = "keyed_map")]
    battles: BTreeMap<BattleId, Battle>,
    #[serde(default, deserialize_with = "keyed_map")]
    players: BTreeMap<PlayerId, TilePlayer>,
    #[serde(default, deserialize_with = "keyed_map")]
    items: BTreeMap<ItemId, Item>,
}

impl Tile {
    /// An empty tile at `location`, keyed the canonical way.
    pub fn empty(location: Location) -> Self {
        Self {
            location,
            chunk_key: location.chunk_key(),
            tile_key: location.tile_key(),
            groups: BTreeMap::new(),
            stranded_groups: BTreeSet::new(),
            structure: None,
            battles: BTreeMap::new(),
            players: BTreeMap::new(),
            items: BTreeMap::new(),
        }
    }

    /// Parse one tile value read from `chunks/{chunk_key}/{tile_key}`.
    ///
    /// Returns `None` when the tile key is not a coordinate or the tile is
    /// not an object.
    pub fn from_value(chunk_key: &str, tile_key: &str, value: Value) -> Option<Self> {
        let Some(location) = Location::parse_key(tile_key) else {
            warn!(chunk_key, tile_key, "tile key is not a coordinate, skipping tile");
            return None;
        };
        if location.chunk_key() != chunk_key {
            warn!(chunk_key, tile_key, "tile stored under the wrong chunk");
        }

        let raw: RawTile = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(chunk_key, tile_key, error = %err, "malformed tile, skipping");
                return None;
            }
        };

        let structure = raw.structure.and_then(|v| {
            if v.is_null() {
                return None;
            }
            serde_json::from_value::<Structure>(v)
                .map_err(|err| warn!(tile_key, error = %err, "malformed structure, ignoring"))
                .ok()
        });

        let (groups, rejected) = partition_keyed::<Group>(raw.groups.unwrap_or(Value::Null));
        let stranded_groups = rejected.into_iter().filter_map(stranded_group).collect();

        let mut battles = raw.battles;
        for battle in battles.values_mut() {
            battle.location = location;
        }

        Some(Self {
            location,
            chunk_key: chunk_key.to_owned(),
            tile_key: tile_key.to_owned(),
            groups,
            stranded_groups,
            structure,
            battles,
            players: raw.players,
            items: raw.items,
        })
    }
}

/// The key of a rejected group record that is marked as fighting or still
/// names a battle.
fn stranded_group(rejected: Rejected) -> Option<GroupId> {
    let key = rejected.key?;
    let record = rejected.value.as_object()?;
    let fighting = matches!(
        record.get("status").and_then(Value::as_str),
        Some("fighting" | "fleeing")
    );
    let linked = record.get("battleId").is_some_and(|v| !v.is_null());
    (fighting || linked).then(|| GroupId::from(key))
}

/// Everything the battle engine reads in one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorldSnapshot {
    /// Tiles by coordinate.
    pub tiles: BTreeMap<Location, Tile>,
    /// Account-level player records.
    pub players: BTreeMap<PlayerId, PlayerRecord>,
}

impl WorldSnapshot {
    /// Assemble a snapshot from the store's world tree.
    ///
    /// Expects `{"chunks": {chunk: {tile: {...}}}, "players": {...}}`.
    /// Missing sections read as empty.
    pub fn from_tree(tree: &Value) -> Self {
        let mut tiles = BTreeMap::new();
        if let Some(chunks) = tree.get("chunks").and_then(Value::as_object) {
            for (chunk_key, chunk) in chunks {
                let Some(chunk_tiles) = chunk.as_object() else {
                    warn!(chunk_key, "chunk is not an object, skipping");
                    continue;
                };
                for (tile_key, tile) in chunk_tiles {
                    if let Some(tile) = Tile::from_value(chunk_key, tile_key, tile.clone()) {
                        tiles.insert(tile.location, tile);
                    }
                }
            }
        }

        let players = tree
            .get("players")
            .cloned()
            .map(collect_keyed::<PlayerRecord>)
            .unwrap_or_default();

        Self { tiles, players }
    }

    /// Look up a tile.
    pub fn tile(&self, location: Location) -> Option<&Tile> {
        self.tiles.get(&location)
    }

    /// Number of battles across the whole world.
    pub fn battle_count(&self) -> usize {
        self.tiles.values().map(|t| t.battles.len()).sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn snapshot_reads_tiles_and_players() {
        let tree = json!({
            "chunks": {
                "0,0": {
                    "3,4": {
                        "groups": {"g1": {"name": "Raiders", "units": {"u1": {"type": "warrior"}}}},
                        "structure": {"id": "s1", "type": "village", "health": 120},
                        "battles": {"b1": {"side1": {"groups": ["g1"]}, "side2": {"groups": []}}},
                        "players": {"p9": {"displayName": "Wren"}}
                    }
                }
            },
            "players": {"p9": {"displayName": "Wren", "alive": true}}
        });
        let snapshot = WorldSnapshot::from_tree(&tree);
        let tile = snapshot.tile(Location::new(3, 4)).unwrap();
        assert_eq!(tile.groups.len(), 1);
        assert_eq!(tile.structure.as_ref().unwrap().current_health(), 120);
        assert_eq!(tile.battles.values().next().unwrap().location, Location::new(3, 4));
        assert_eq!(tile.players.len(), 1);
        assert_eq!(snapshot.players.len(), 1);
        assert_eq!(snapshot.battle_count(), 1);
    }

    #[test]
    fn malformed_pieces_do_not_poison_the_world() {
        let tree = json!({
            "chunks": {
                "0,0": {
                    "1,1": {"structure": "rubble", "groups": {"g1": {"units": []}}},
                    "nope": {"groups": {}},
                    "2,2": 17
                },
                "broken": "chunk"
            }
        });
        let snapshot = WorldSnapshot::from_tree(&tree);
        assert_eq!(snapshot.tiles.len(), 1);
        let tile = snapshot.tile(Location::new(1, 1)).unwrap();
        assert!(tile.structure.is_none());
        assert_eq!(tile.groups.len(), 1);
    }

    #[test]
    fn unreadable_linked_groups_are_remembered() {
        let tree = json!({
            "chunks": {"0,0": {"1,1": {"groups": {
                "ok": {"status": "fighting", "battleId": "b1"},
                "stuck": {"id": {"broken": true}, "status": "fighting", "battleId": "b1"},
                "idle": {"id": 9, "status": "idle"},
                "junk": "not a group"
            }}}}
        });
        let snapshot = WorldSnapshot::from_tree(&tree);
        let tile = snapshot.tile(Location::new(1, 1)).unwrap();
        assert_eq!(tile.groups.keys().collect::<Vec<_>>(), vec![&GroupId::from("ok")]);
        assert_eq!(
            tile.stranded_groups.iter().collect::<Vec<_>>(),
            vec![&GroupId::from("stuck")]
        );
    }

    #[test]
    fn empty_tree_is_empty_snapshot() {
        let snapshot = WorldSnapshot::from_tree(&json!({}));
        assert!(snapshot.tiles.is_empty());
        assert!(snapshot.players.is_empty());
    }
}
