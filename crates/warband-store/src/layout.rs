//! Store path scheme for every record the battle engine touches.
//!
//! | Path | Record |
//! |------|--------|
//! | `chunks/{cx,cy}/{x,y}/groups/{groupId}` | group |
//! | `chunks/{cx,cy}/{x,y}/structure` | structure |
//! | `chunks/{cx,cy}/{x,y}/battles/{battleId}` | battle |
//! | `chunks/{cx,cy}/{x,y}/players/{playerId}` | standalone player |
//! | `chunks/{cx,cy}/{x,y}/items/{itemId}` | tile treasure |
//! | `players/{playerId}` | player record |
//! | `events/{eventId}` | world event |
//!
//! Tile paths use the keys the tile was read from, so a tile stored under
//! a non-canonical chunk is written back where it lives.

use warband_types::{BattleId, EventId, GroupId, PlayerId, Tile};

use crate::path::Path;

/// Top-level namespace holding the spatial partition.
pub const CHUNKS: &str = "chunks";
/// Top-level namespace for account-level player records.
pub const PLAYERS: &str = "players";
/// Top-level namespace for the world event log.
pub const EVENTS: &str = "events";

/// `chunks/{cx,cy}/{x,y}`
pub fn tile(tile: &Tile) -> Path {
    Path::from_segments([CHUNKS, tile.chunk_key.as_str(), tile.tile_key.as_str()])
}

/// `.../groups/{groupId}`
pub fn group(tile_ref: &Tile, id: &GroupId) -> Path {
    tile(tile_ref).child("groups").child(id.as_str())
}

/// `.../groups/{groupId}/{field}`
pub fn group_field(tile_ref: &Tile, id: &GroupId, field: &str) -> Path {
    group(tile_ref, id).child(field)
}

/// `.../groups/{groupId}/units`, written back as a whole container.
pub fn group_units(tile_ref: &Tile, id: &GroupId) -> Path {
    group_field(tile_ref, id, "units")
}

/// `.../groups/{groupId}/items`, written back as a whole container.
pub fn group_items(tile_ref: &Tile, id: &GroupId) -> Path {
    group_field(tile_ref, id, "items")
}

/// `.../structure`
pub fn structure(tile_ref: &Tile) -> Path {
    tile(tile_ref).child("structure")
}

/// `.../structure/{field}`
pub fn structure_field(tile_ref: &Tile, field: &str) -> Path {
    structure(tile_ref).child(field)
}

/// `.../battles/{battleId}`
pub fn battle(tile_ref: &Tile, id: &BattleId) -> Path {
    tile(tile_ref).child("battles").child(id.as_str())
}

/// `.../battles/{battleId}/{field}`
pub fn battle_field(tile_ref: &Tile, id: &BattleId, field: &str) -> Path {
    battle(tile_ref, id).child(field)
}

/// `.../players/{playerId}` (standalone player on the tile)
pub fn tile_player(tile_ref: &Tile, id: &PlayerId) -> Path {
    tile(tile_ref).child("players").child(id.as_str())
}

/// `.../items`, the tile's treasure container.
pub fn tile_items(tile_ref: &Tile) -> Path {
    tile(tile_ref).child("items")
}

/// `players/{playerId}`
pub fn player(id: &PlayerId) -> Path {
    Path::from_segments([PLAYERS, id.as_str()])
}

/// `players/{playerId}/{field}`
pub fn player_field(id: &PlayerId, field: &str) -> Path {
    player(id).child(field)
}

/// `events/{eventId}`
pub fn event(id: &EventId) -> Path {
    Path::from_segments([EVENTS, id.as_str()])
}

#[cfg(test)]
mod tests {
    use warband_types::Location;

    use super::*;

    #[test]
    fn tile_paths_use_chunk_and_tile_keys() {
        let tile_ref = Tile::empty(Location::new(-1, 45));
        assert_eq!(tile(&tile_ref).to_string(), "chunks/-1,2/-1,45");
        assert_eq!(
            group_units(&tile_ref, &GroupId::from("g1")).to_string(),
            "chunks/-1,2/-1,45/groups/g1/units"
        );
        assert_eq!(
            battle_field(&tile_ref, &BattleId::from("b1"), "tickCount").to_string(),
            "chunks/-1,2/-1,45/battles/b1/tickCount"
        );
    }

    #[test]
    fn namespace_paths() {
        assert_eq!(player_field(&PlayerId::from("p1"), "alive").to_string(), "players/p1/alive");
        assert_eq!(event(&EventId::from("e1")).to_string(), "events/e1");
    }
}
