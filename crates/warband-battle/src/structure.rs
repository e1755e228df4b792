//! Structure damage, destruction and capture.
//!
//! Damage per tick scales with the attacker's power relative to the
//! structure's durability:
//!
//! ```text
//! ratio  = attacker / durability
//! factor = ratio               (ratio <= 1)
//!        = 1 + ln(ratio)       (ratio >  1)
//! cap    = 25% of durability, rising toward 75% as ratio grows
//! damage = clamp(durability * 10% * factor, 1, cap)
//! ```
//!
//! A structure cannot fall on the first tick of a battle. At zero health it
//! is destroyed: its items are pooled and standalone players on the tile
//! die in the collapse.

use tracing::info;

use warband_store::{UpdateBatch, layout};
use warband_types::{BattleEventKind, BattleSide, Group, GroupKind, Structure};

use crate::attrition::to_count;
use crate::config::BattleConfig;
use crate::error::BattleError;
use crate::events::{self, Chronicle};
use crate::loot::LootPool;
use crate::power::group_power;
use crate::resolve::Scene;
use crate::side::record_player_death;

/// Damage dealt to a structure in one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureTick {
    /// Damage applied.
    pub damage: u32,
    /// Health before the hit.
    pub health_before: u32,
    /// Health after the hit.
    pub health_after: u32,
    /// Health reached zero.
    pub destroyed: bool,
}

/// Per-tick damage an attacker of `attacker_power` deals to a structure
/// with `durability`. Zero when the attacker has no power.
pub fn damage_for(attacker_power: f64, durability: u32, config: &BattleConfig) -> u32 {
    if !attacker_power.is_finite() || attacker_power <= 0.0 || durability == 0 {
        return 0;
    }
    let durability = f64::from(durability);
    let ratio = attacker_power / durability;
    let (factor, cap_fraction) = if ratio <= 1.0 {
        (ratio, config.structure_cap_floor)
    } else {
        (
            1.0 + ratio.ln(),
            config
                .structure_cap_span
                .mul_add(1.0 - ratio.recip(), config.structure_cap_floor),
        )
    };
    let cap = (durability * cap_fraction).max(1.0);
    let raw = durability * config.structure_damage_fraction * factor;
    to_count(raw.clamp(1.0, cap))
}

/// Apply one tick of damage. On the battle's first tick health floors at 1.
pub fn apply_damage(
    structure: &Structure,
    attacker_power: f64,
    first_tick: bool,
    config: &BattleConfig,
) -> StructureTick {
    let health_before = structure.current_health();
    let damage = damage_for(attacker_power, structure.max_health(), config);
    let mut health_after = health_before.saturating_sub(damage);
    if first_tick {
        health_after = health_after.max(health_before.min(1));
    }
    StructureTick {
        damage: health_before.saturating_sub(health_after),
        health_before,
        health_after,
        destroyed: health_after == 0,
    }
}

/// Whether a structure still keeps its side in the fight.
pub fn holds(structure: Option<&Structure>, config: &BattleConfig) -> bool {
    structure.is_some_and(|s| {
        f64::from(s.current_health()) / f64::from(s.max_health()) >= config.defeated_structure_fraction
    })
}

/// Record a damage tick: either the new health or the destruction.
///
/// On destruction the structure's items join the pool (tagged with the
/// defending side) and every standalone player on the tile dies.
pub fn record_damage(
    scene: &Scene<'_>,
    structure: &mut Structure,
    hit: StructureTick,
    defender: BattleSide,
    pool: &mut LootPool,
    chronicle: &mut Chronicle,
    batch: &mut UpdateBatch,
) -> Result<(), BattleError> {
    let location = scene.tile.location;
    let name = structure.display_name().to_owned();

    if !hit.destroyed {
        // Out-of-range stored health is written back clamped.
        let stored = structure.health.replace(hit.health_after);
        if hit.damage > 0 || stored.is_some_and(|h| h != hit.health_after) {
            batch.set(layout::structure_field(scene.tile, "health"), &hit.health_after)?;
        }
        if hit.damage > 0 {
            chronicle.log(
                BattleEventKind::StructureDamaged,
                events::structure_damaged(&name, hit.damage, hit.health_after, structure.max_health()),
            );
        }
        return Ok(());
    }

    structure.health = Some(0);
    pool.collect(std::mem::take(&mut structure.items).into_values(), defender);
    batch.delete(layout::structure(scene.tile));
    chronicle.record(BattleEventKind::StructureDestroyed, events::structure_destroyed(&name, location));

    for (id, player) in &scene.tile.players {
        let player_name = player
            .display_name
            .clone()
            .or_else(|| scene.players.get(id).and_then(|p| p.display_name.clone()))
            .unwrap_or_else(|| id.to_string());
        record_player_death(scene, id, events::crushed_message(&name, location), batch)?;
        batch.delete(layout::tile_player(scene.tile, id));
        chronicle.record(
            BattleEventKind::StructureDestroyed,
            events::crushed(&player_name, &name, location),
        );
    }

    info!(
        battle_id = %scene.battle_id,
        x = location.x,
        y = location.y,
        structure = %name,
        crushed = scene.tile.players.len(),
        "Structure destroyed"
    );
    Ok(())
}

/// Settle a standing structure after the attackers won.
///
/// The owner of the strongest surviving attacking group takes it; a monster
/// winner razes it instead, pooling its items for the defending side's loss.
pub fn capture_or_raze<'g>(
    scene: &Scene<'_>,
    structure: &mut Structure,
    attackers: impl IntoIterator<Item = &'g Group>,
    defender: BattleSide,
    pool: &mut LootPool,
    chronicle: &mut Chronicle,
    batch: &mut UpdateBatch,
) -> Result<bool, BattleError> {
    let Some(strongest) = attackers
        .into_iter()
        .max_by(|a, b| group_power(a).cmp(&group_power(b)).then_with(|| b.id.cmp(&a.id)))
    else {
        release(scene, batch);
        return Ok(false);
    };

    let location = scene.tile.location;
    let name = structure.display_name().to_owned();
    match (&strongest.owner, strongest.kind) {
        (Some(owner), GroupKind::Player) => {
            structure.owner = Some(owner.clone());
            batch.set(layout::structure_field(scene.tile, "owner"), owner)?;
            release(scene, batch);
            chronicle.record(
                BattleEventKind::Other,
                events::captured(&name, strongest.display_name(), location),
            );
            Ok(true)
        }
        _ => {
            pool.collect(std::mem::take(&mut structure.items).into_values(), defender);
            batch.delete(layout::structure(scene.tile));
            chronicle.record(
                BattleEventKind::StructureDestroyed,
                events::razed(&name, strongest.display_name(), location),
            );
            Ok(true)
        }
    }
}

/// Clear a structure's battle linkage.
pub fn release(scene: &Scene<'_>, batch: &mut UpdateBatch) {
    batch.delete(layout::structure_field(scene.tile, "battleId"));
    batch.delete(layout::structure_field(scene.tile, "battleSide"));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;
    use warband_store::Op;
    use warband_types::{BattleId, Location, PlayerId, Tile, TilePlayer};

    use super::*;

    fn structure(kind: &str, health: Option<u32>) -> Structure {
        serde_json::from_value(json!({"id": "s1", "type": kind, "health": health, "items": [{"id": "i1", "type": "gold"}]}))
            .unwrap()
    }

    #[test]
    fn modest_attacker_deals_proportional_damage() {
        let config = BattleConfig::default();
        // camp durability 100, attacker 50: 100 * 0.1 * 0.5
        assert_eq!(damage_for(50.0, 100, &config), 5);
        assert_eq!(damage_for(0.0, 100, &config), 0);
        assert_eq!(damage_for(0.1, 100, &config), 1);
    }

    #[test]
    fn overwhelming_attacker_is_capped() {
        let config = BattleConfig::default();
        // ratio 100: factor 1 + ln(100) ~ 5.6; cap 0.25 + 0.5 * 0.99 = 0.745
        let damage = damage_for(10_000.0, 100, &config);
        assert!(damage <= 75);
        assert!(damage >= 50);
        assert!(damage_for(1_000_000.0, 100, &config) <= 75);
    }

    #[test]
    fn first_tick_cannot_destroy() {
        let config = BattleConfig::default();
        let camp = structure("camp", Some(3));
        let hit = apply_damage(&camp, 10_000.0, true, &config);
        assert_eq!(hit.health_after, 1);
        assert!(!hit.destroyed);
        let hit = apply_damage(&camp, 10_000.0, false, &config);
        assert!(hit.destroyed);
        assert_eq!(hit.damage, 3);
    }

    #[test]
    fn holds_below_threshold() {
        let config = BattleConfig::default();
        assert!(holds(Some(&structure("camp", Some(15))), &config));
        assert!(!holds(Some(&structure("camp", Some(14))), &config));
        assert!(!holds(None, &config));
    }

    #[test]
    fn destruction_pools_items_and_crushes_tile_players() {
        let mut tile = Tile::empty(Location::new(4, 4));
        tile.players.insert(
            PlayerId::from("p7"),
            TilePlayer {
                id: PlayerId::from("p7"),
                display_name: Some(String::from("Wren")),
            },
        );
        let players = BTreeMap::new();
        let battle_id = BattleId::from("b1");
        let scene = Scene {
            battle_id: &battle_id,
            tile: &tile,
            players: &players,
            tick: 5,
            now_ms: 0,
        };
        let mut camp = structure("camp", Some(2));
        let hit = apply_damage(&camp, 500.0, false, &BattleConfig::default());
        let mut pool = LootPool::new();
        let mut chronicle = Chronicle::new(5, tile.location);
        let mut batch = UpdateBatch::new();
        record_damage(&scene, &mut camp, hit, BattleSide::Side2, &mut pool, &mut chronicle, &mut batch)
            .unwrap();

        assert_eq!(pool.from_side(BattleSide::Side2), 1);
        assert_eq!(batch.get(&layout::structure(&tile)), Some(&Op::Delete));
        assert_eq!(batch.get(&layout::tile_player(&tile, &PlayerId::from("p7"))), Some(&Op::Delete));
        assert_eq!(
            batch.get(&layout::player_field(&PlayerId::from("p7"), "alive")),
            Some(&Op::Set(json!(false)))
        );
    }
}
