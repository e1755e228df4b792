//! Applying one side's attrition to its groups and units.
//!
//! ## Side flow
//!
//! 1. Fleeing groups leave the battle untouched (status idle, linkage cleared)
//! 2. Attrition is apportioned across the remaining groups by power share,
//!    largest remainder first, capped at each group's unit count
//! 3. Casualties are drawn at random; a lone player in a group of other
//!    units is only taken once the other units are gone
//! 4. Dead player units become [`PlayerDeath`]s with killer attribution
//! 5. Groups left without units are deleted and their items pooled as loot

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::debug;

use warband_store::{UpdateBatch, layout};
use warband_types::{BattleEventKind, BattleSide, Group, GroupId, GroupStatus, PlayerId, PlayerMessage, UnitId};

use crate::attrition::CriticalHit;
use crate::error::BattleError;
use crate::events::{self, Chronicle, Killer};
use crate::loot::LootPool;
use crate::power::{group_power, side_power};
use crate::resolve::Scene;

/// A player unit killed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDeath {
    /// The dead player's account.
    pub player: PlayerId,
    /// Display name used in event text.
    pub name: String,
    /// Group the unit belonged to.
    pub group: GroupId,
    /// The removed unit.
    pub unit: UnitId,
    /// Who landed the killing blow, if known.
    pub killer: Option<Killer>,
}

/// What one side looks like after its casualties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideOutcome {
    /// Sum of surviving group powers (structure excluded).
    pub remaining_power: u64,
    /// Casualties applied this tick.
    pub applied: u32,
    /// Cumulative casualty counter after this tick.
    pub total_casualties: u32,
    /// Units present before casualties.
    pub units_before: usize,
    /// Units still standing.
    pub units_after: usize,
    /// Groups still in the fight.
    pub survivors: Vec<GroupId>,
    /// Groups deleted this tick.
    pub wiped: Vec<GroupId>,
    /// Player units killed this tick.
    pub deaths: Vec<PlayerDeath>,
}

/// What the opposing side brings to this side's casualty pass.
#[derive(Debug, Clone, Copy)]
pub struct Opposition<'x> {
    /// Critical hits the opposing side landed this tick.
    pub hits: &'x [CriticalHit],
    /// Names a non-critical killing blow can be attributed to.
    pub combatants: &'x [String],
}

// ---------------------------------------------------------------------------
// Apportionment and selection
// ---------------------------------------------------------------------------

/// Split `attrition` across groups of the given `(power, unit count)`.
///
/// Each group gets `floor(attrition * power / total)`, then the shortfall
/// goes one casualty at a time to the largest remainders. The result sums
/// to `min(attrition, total units)` and no group exceeds its unit count.
pub fn apportion(groups: &[(u64, u32)], attrition: u32) -> Vec<u32> {
    let available = groups
        .iter()
        .map(|&(_, units)| units)
        .fold(0_u32, u32::saturating_add);
    let target = attrition.min(available);
    let total_power = groups
        .iter()
        .map(|&(power, _)| u128::from(power))
        .fold(0_u128, u128::saturating_add);

    let mut allocation: Vec<u32> = Vec::with_capacity(groups.len());
    let mut remainders: Vec<(u128, usize)> = Vec::with_capacity(groups.len());
    for (index, &(power, units)) in groups.iter().enumerate() {
        let (share, remainder) = if total_power == 0 {
            (u128::from(target), 0)
        } else {
            let exact = u128::from(target).saturating_mul(u128::from(power));
            (
                exact.checked_div(total_power).unwrap_or(0),
                exact.checked_rem(total_power).unwrap_or(0),
            )
        };
        let share = u32::try_from(share).unwrap_or(u32::MAX).min(units);
        allocation.push(share);
        remainders.push((remainder, index));
    }

    let assigned = allocation.iter().fold(0_u32, |acc, &n| acc.saturating_add(n));
    let mut shortfall = target.saturating_sub(assigned);
    // Largest remainder first; earlier groups win ties.
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    while shortfall > 0 {
        let mut progressed = false;
        for &(_, index) in &remainders {
            if shortfall == 0 {
                break;
            }
            let cap = groups.get(index).map_or(0, |&(_, units)| units);
            if let Some(slot) = allocation.get_mut(index).filter(|slot| **slot < cap) {
                *slot = slot.saturating_add(1);
                shortfall = shortfall.saturating_sub(1);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    allocation
}

/// Pick `count` units of `group` to remove.
///
/// A group with exactly one player unit and at least one other unit keeps
/// its player while the other units can absorb every casualty.
pub fn select_casualties(group: &Group, count: u32, rng: &mut impl Rng) -> Vec<UnitId> {
    if count == 0 {
        return Vec::new();
    }
    let wanted = usize::try_from(count).unwrap_or(usize::MAX);
    let players = group.units.values().filter(|u| u.is_player()).count();
    let others: Vec<UnitId> = group
        .units
        .values()
        .filter(|u| !u.is_player())
        .map(|u| u.id.clone())
        .collect();

    let mut pool: Vec<UnitId> = if players == 1 && !others.is_empty() && wanted <= others.len() {
        others
    } else {
        group.units.keys().cloned().collect()
    };

    let take = wanted.min(pool.len());
    for i in 0..take {
        let j = rng.random_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(take);
    pool
}

// ---------------------------------------------------------------------------
// Player bookkeeping
// ---------------------------------------------------------------------------

/// Record a player's death on their account record.
pub fn record_player_death(
    scene: &Scene<'_>,
    player: &PlayerId,
    message: String,
    batch: &mut UpdateBatch,
) -> Result<(), BattleError> {
    batch.set(layout::player_field(player, "alive"), &false)?;
    batch.delete(layout::player_field(player, "inGroup"));
    batch.set(layout::player_field(player, "lastLocation"), &scene.tile.location)?;
    notify(scene, player, message, batch)
}

/// Set a player's `lastMessage`.
pub fn notify(
    scene: &Scene<'_>,
    player: &PlayerId,
    text: String,
    batch: &mut UpdateBatch,
) -> Result<(), BattleError> {
    let message = PlayerMessage {
        text,
        timestamp: scene.now_ms,
    };
    batch.set(layout::player_field(player, "lastMessage"), &message)?;
    Ok(())
}

/// Record the writes that take a group out of the battle.
pub fn release_group(scene: &Scene<'_>, group: &Group, batch: &mut UpdateBatch) -> Result<(), BattleError> {
    batch.set(layout::group_field(scene.tile, &group.id, "status"), &GroupStatus::Idle)?;
    for field in ["battleId", "battleSide", "battleRole"] {
        batch.delete(layout::group_field(scene.tile, &group.id, field));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SideProcessor
// ---------------------------------------------------------------------------

/// Applies attrition to one side of a battle.
#[derive(Debug, Clone, Copy)]
pub struct SideProcessor<'s, 'a> {
    scene: &'s Scene<'a>,
    side: BattleSide,
}

impl<'s, 'a> SideProcessor<'s, 'a> {
    /// A processor for `side`.
    pub const fn new(scene: &'s Scene<'a>, side: BattleSide) -> Self {
        Self { scene, side }
    }

    /// Remove groups in `fleeing` status from the fight.
    ///
    /// They take no casualties this tick; their status returns to idle and
    /// their battle linkage is cleared.
    pub fn withdraw_fleeing(
        &self,
        groups: &mut BTreeMap<GroupId, Group>,
        chronicle: &mut Chronicle,
        batch: &mut UpdateBatch,
    ) -> Result<Vec<GroupId>, BattleError> {
        let fleeing: Vec<GroupId> = groups
            .values()
            .filter(|g| g.status == GroupStatus::Fleeing)
            .map(|g| g.id.clone())
            .collect();
        for id in &fleeing {
            if let Some(group) = groups.remove(id) {
                release_group(self.scene, &group, batch)?;
                chronicle.record(
                    BattleEventKind::Flee,
                    events::fled(group.display_name(), self.scene.tile.location),
                );
                debug!(battle_id = %self.scene.battle_id, group_id = %id, side = %self.side, "Group fled");
            }
        }
        Ok(fleeing)
    }

    /// Apply `attrition` casualties across `groups`.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        groups: &mut BTreeMap<GroupId, Group>,
        attrition: u32,
        prior_casualties: u32,
        opposition: Opposition<'_>,
        flags_changed: &BTreeSet<GroupId>,
        pool: &mut LootPool,
        chronicle: &mut Chronicle,
        batch: &mut UpdateBatch,
        rng: &mut impl Rng,
    ) -> Result<SideOutcome, BattleError> {
        let location = self.scene.tile.location;
        let units_before = groups.values().map(|g| g.units.len()).sum();

        let ids: Vec<GroupId> = groups.keys().cloned().collect();
        let shape: Vec<(u64, u32)> = groups
            .values()
            .map(|g| (group_power(g), u32::try_from(g.units.len()).unwrap_or(u32::MAX)))
            .collect();
        let allocation = apportion(&shape, attrition);

        let mut outcome = SideOutcome {
            units_before,
            ..SideOutcome::default()
        };

        for (id, &count) in ids.iter().zip(allocation.iter()) {
            let Some(group) = groups.get_mut(id) else {
                continue;
            };
            let victims = select_casualties(group, count, rng);
            for unit_id in &victims {
                let Some(unit) = group.units.remove(unit_id) else {
                    continue;
                };
                outcome.applied = outcome.applied.saturating_add(1);
                let Some(player) = unit.player.clone() else {
                    continue;
                };
                let killer = attribute_kill(unit_id, opposition, rng);
                let name = self.player_name(&player, unit.display_name());
                record_player_death(
                    self.scene,
                    &player,
                    events::death_message(killer.as_ref(), location),
                    batch,
                )?;
                chronicle.record(
                    BattleEventKind::Casualties,
                    events::death_event(&name, killer.as_ref(), location),
                );
                outcome.deaths.push(PlayerDeath {
                    player,
                    name,
                    group: id.clone(),
                    unit: unit_id.clone(),
                    killer,
                });
            }

            if group.units.is_empty() {
                self.wipe(group, pool, chronicle, batch);
                outcome.wiped.push(id.clone());
            } else if !victims.is_empty() || flags_changed.contains(id) {
                batch.set(layout::group_units(self.scene.tile, id), &group.units)?;
            }
        }

        for id in &outcome.wiped {
            groups.remove(id);
        }

        outcome.units_after = groups.values().map(|g| g.units.len()).sum();
        outcome.survivors = groups.keys().cloned().collect();
        outcome.remaining_power = side_power(groups.values(), None);
        outcome.total_casualties = prior_casualties.saturating_add(outcome.applied);

        debug!(
            battle_id = %self.scene.battle_id,
            side = %self.side,
            attrition,
            applied = outcome.applied,
            wiped = outcome.wiped.len(),
            survivors = outcome.survivors.len(),
            "Side processed"
        );
        Ok(outcome)
    }

    fn wipe(
        &self,
        group: &mut Group,
        pool: &mut LootPool,
        chronicle: &mut Chronicle,
        batch: &mut UpdateBatch,
    ) {
        pool.collect(std::mem::take(&mut group.items).into_values(), self.side);
        batch.delete(layout::group(self.scene.tile, &group.id));
        for (player, record) in self.scene.players {
            if record.in_group.as_ref() == Some(&group.id) {
                batch.delete(layout::player_field(player, "inGroup"));
            }
        }
        chronicle.record(
            BattleEventKind::GroupDestroyed,
            events::wiped_out(group.display_name(), self.scene.tile.location),
        );
    }

    fn player_name(&self, player: &PlayerId, fallback: &str) -> String {
        self.scene
            .players
            .get(player)
            .and_then(|p| p.display_name.clone())
            .unwrap_or_else(|| fallback.to_owned())
    }
}

/// Who killed `victim`: a critical hit aimed at it, or a random opposing
/// combatant.
fn attribute_kill(victim: &UnitId, opposition: Opposition<'_>, rng: &mut impl Rng) -> Option<Killer> {
    if let Some(hit) = opposition.hits.iter().find(|h| &h.target == victim) {
        return Some(Killer {
            name: hit.name.clone(),
            critical: true,
            combo: hit.combo,
        });
    }
    if opposition.combatants.is_empty() {
        return None;
    }
    let pick = rng.random_range(0..opposition.combatants.len());
    opposition.combatants.get(pick).map(|name| Killer {
        name: name.clone(),
        critical: false,
        combo: false,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;
    use warband_store::Op;
    use warband_types::{BattleId, Location, PlayerRecord, Tile};

    use super::*;

    fn group(id: &str, units: serde_json::Value) -> Group {
        serde_json::from_value(json!({"id": id, "name": id, "units": units, "items": [{"id": format!("{id}-loot"), "type": "gold"}]}))
            .unwrap()
    }

    #[test]
    fn apportion_sums_to_capped_attrition() {
        assert_eq!(apportion(&[(3, 3), (1, 1)], 2), vec![2, 0]);
        assert_eq!(apportion(&[(1, 1), (1, 1), (1, 1)], 2).iter().sum::<u32>(), 2);
        assert_eq!(apportion(&[(10, 2), (1, 1)], 10), vec![2, 1]);
        assert_eq!(apportion(&[], 5), Vec::<u32>::new());
        assert_eq!(apportion(&[(0, 0)], 5), vec![0]);
    }

    #[test]
    fn lone_player_is_protected() {
        let g = group("g", json!([{"id": "p", "player": "p1"}, {"id": "a"}, {"id": "b"}]));
        let mut rng = SmallRng::seed_from_u64(9);
        for _ in 0..100 {
            let picked = select_casualties(&g, 2, &mut rng);
            assert_eq!(picked.len(), 2);
            assert!(!picked.contains(&UnitId::from("p")));
        }
        assert_eq!(select_casualties(&g, 3, &mut rng).len(), 3);
        assert!(select_casualties(&g, 0, &mut rng).is_empty());
    }

    #[test]
    fn wiped_group_is_deleted_and_looted() {
        let tile = Tile::empty(Location::new(1, 1));
        let players = BTreeMap::from([(
            PlayerId::from("p1"),
            PlayerRecord {
                id: PlayerId::from("p1"),
                display_name: Some(String::from("Ash")),
                alive: true,
                last_location: None,
                last_message: None,
                in_group: Some(GroupId::from("g1")),
            },
        )]);
        let battle_id = BattleId::from("b1");
        let scene = Scene {
            battle_id: &battle_id,
            tile: &tile,
            players: &players,
            tick: 3,
            now_ms: 1_000,
        };

        let mut groups = BTreeMap::from([
            (GroupId::from("g1"), group("g1", json!([{"id": "u1", "player": "p1"}]))),
            (GroupId::from("g2"), group("g2", json!([{"id": "u2"}, {"id": "u3"}, {"id": "u4"}]))),
        ]);
        let mut pool = LootPool::new();
        let mut chronicle = Chronicle::new(3, tile.location);
        let mut batch = UpdateBatch::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let combatants = vec![String::from("Wolf")];

        let outcome = SideProcessor::new(&scene, BattleSide::Side1)
            .apply(
                &mut groups,
                4,
                1,
                Opposition { hits: &[], combatants: &combatants },
                &BTreeSet::new(),
                &mut pool,
                &mut chronicle,
                &mut batch,
                &mut rng,
            )
            .unwrap();

        assert_eq!(outcome.applied, 4);
        assert_eq!(outcome.total_casualties, 5);
        assert_eq!(outcome.units_after, 0);
        assert_eq!(outcome.wiped.len(), 2);
        assert_eq!(outcome.deaths.len(), 1);
        assert_eq!(outcome.deaths.first().unwrap().name, "Ash");
        assert_eq!(pool.len(), 2);
        assert!(groups.is_empty());
        assert_eq!(batch.get(&layout::group(&tile, &GroupId::from("g1"))), Some(&Op::Delete));
        assert_eq!(
            batch.get(&layout::player_field(&PlayerId::from("p1"), "alive")),
            Some(&Op::Set(json!(false)))
        );
    }

    #[test]
    fn fleeing_groups_leave_without_casualties() {
        let tile = Tile::empty(Location::new(1, 1));
        let players = BTreeMap::new();
        let battle_id = BattleId::from("b1");
        let scene = Scene {
            battle_id: &battle_id,
            tile: &tile,
            players: &players,
            tick: 1,
            now_ms: 0,
        };
        let mut runner = group("g1", json!([{"id": "u1"}]));
        runner.status = GroupStatus::Fleeing;
        let mut groups = BTreeMap::from([(GroupId::from("g1"), runner)]);
        let mut chronicle = Chronicle::new(1, tile.location);
        let mut batch = UpdateBatch::new();

        let fled = SideProcessor::new(&scene, BattleSide::Side2)
            .withdraw_fleeing(&mut groups, &mut chronicle, &mut batch)
            .unwrap();
        assert_eq!(fled, vec![GroupId::from("g1")]);
        assert!(groups.is_empty());
        assert_eq!(
            batch.get(&layout::group_field(&tile, &GroupId::from("g1"), "status")),
            Some(&Op::Set(json!("idle")))
        );
        assert_eq!(chronicle.world.len(), 1);
    }
}
