//! One battle, one tick: the full resolution pipeline.
//!
//! ## Battle tick flow
//!
//! 1. Look up the battle and its tile; repair the roster in memory
//! 2. Withdraw fleeing groups
//! 3. Roll PvP critical hits
//! 4. Evaluate and jitter each side's power (structure on the defending side)
//! 5. Compute attrition, with the stalemate guard
//! 6. Apply casualties to both sides from the same pre-casualty state
//! 7. Damage the linked structure
//! 8. Decide the outcome
//! 9. Terminal: forfeits, structure capture, loot, cleanup, battle deletion
//!    Continuing: persist rosters, counters, tick count and the battle log
//!
//! Everything is recorded into one [`UpdateBatch`]; nothing is written here.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use tracing::{debug, info, warn};

use warband_store::{UpdateBatch, layout};
use warband_types::{
    Battle, BattleEventKind, BattleId, BattleRole, BattleSide, BattleStatus, EventId, Group,
    GroupId, Location, PlayerId, PlayerRecord, Structure, Tile, WorldSnapshot,
};

use crate::attrition::{self, Attrition, CritTally};
use crate::config::BattleConfig;
use crate::error::BattleError;
use crate::events::{self, Chronicle};
use crate::locator::BattleRef;
use crate::loot::{self, LootDrop, LootPool};
use crate::outcome::{self, Decision, Outcome, Standing};
use crate::power::{self, SidePair};
use crate::side::{Opposition, SideOutcome, SideProcessor, notify, release_group};
use crate::structure::{self, StructureTick};

/// Read-only context shared by every phase of one battle tick.
#[derive(Debug, Clone, Copy)]
pub struct Scene<'a> {
    /// The battle being resolved.
    pub battle_id: &'a BattleId,
    /// The battle's tile as of the snapshot.
    pub tile: &'a Tile,
    /// Account-level player records.
    pub players: &'a BTreeMap<PlayerId, PlayerRecord>,
    /// World tick being resolved.
    pub tick: u64,
    /// Wall-clock time stamped on events and messages (Unix ms).
    pub now_ms: i64,
}

/// Summary of one resolved battle tick.
#[derive(Debug, Clone, PartialEq)]
pub struct BattleReport {
    /// The battle.
    pub battle_id: BattleId,
    /// Where it is.
    pub location: Location,
    /// What happened.
    pub outcome: Outcome,
    /// The long-stalemate guard imposed the outcome.
    pub forced: bool,
    /// Jittered power per side before casualties.
    pub power: SidePair<f64>,
    /// Casualties applied per side this tick.
    pub casualties: SidePair<u32>,
    /// Critical hits per side this tick.
    pub crits: SidePair<usize>,
    /// Units standing per side after casualties.
    pub units_after: SidePair<usize>,
    /// Player units killed.
    pub deaths: usize,
    /// Groups that fled.
    pub fled: usize,
    /// The stalemate guard chose this tick's casualties.
    pub stalemate_break: bool,
    /// Damage to the linked structure, if any.
    pub structure: Option<StructureTick>,
    /// Loot delivery on a terminal tick.
    pub loot: Option<LootDrop>,
}

/// The batch to commit for one battle and its report.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Every mutation for this battle.
    pub batch: UpdateBatch,
    /// What happened.
    pub report: BattleReport,
}

fn side_name(battle: &Battle, side: BattleSide) -> String {
    let name = &battle.side(side).name;
    if name.is_empty() {
        format!("Side {}", side.number())
    } else {
        name.clone()
    }
}

/// Drop roster entries that cannot take part, logging each repair.
fn repair_roster(battle: &mut Battle, tile: &Tile) {
    let duplicated: Vec<GroupId> = battle
        .side1
        .groups
        .intersection(&battle.side2.groups)
        .cloned()
        .collect();
    for id in duplicated {
        warn!(battle_id = %battle.id, group_id = %id, "Group listed on both sides, keeping side 1");
        battle.side2.groups.remove(&id);
    }
    let battle_id = battle.id.clone();
    for side in [BattleSide::Side1, BattleSide::Side2] {
        let record = battle.side_mut(side);
        let missing: Vec<GroupId> = record
            .groups
            .iter()
            .filter(|id| !tile.groups.contains_key(*id))
            .cloned()
            .collect();
        for id in missing {
            warn!(battle_id = %battle_id, group_id = %id, %side, "Roster entry has no group, dropping");
            record.groups.remove(&id);
        }
    }
}

/// Which side a linked structure defends.
fn defending_side(structure: &Structure, battle: &Battle, tile: &Tile) -> BattleSide {
    if let Some(side) = structure.battle_side {
        return side;
    }
    let defends = |side: BattleSide| {
        battle
            .side(side)
            .groups
            .iter()
            .filter_map(|id| tile.groups.get(id))
            .any(|g| g.battle_role == Some(BattleRole::Defender))
    };
    if defends(BattleSide::Side1) && !defends(BattleSide::Side2) {
        BattleSide::Side1
    } else {
        BattleSide::Side2
    }
}

fn combatant_names(groups: &BTreeMap<GroupId, Group>, structure: Option<&Structure>) -> Vec<String> {
    groups
        .values()
        .flat_map(|g| g.units.values().map(|u| u.display_name().to_owned()))
        .chain(structure.map(|s| s.display_name().to_owned()))
        .collect()
}

/// Advance one battle by one tick.
///
/// # Errors
///
/// Returns [`BattleError::MissingRecord`] if the battle or its tile is gone,
/// [`BattleError::Computation`] if power evaluation is not finite, and
/// [`BattleError::Store`] if a mutation cannot be serialized.
pub fn resolve_battle(
    snapshot: &WorldSnapshot,
    target: &BattleRef,
    tick: u64,
    now_ms: i64,
    config: &BattleConfig,
    rng: &mut impl Rng,
) -> Result<Resolution, BattleError> {
    let missing = |reason| BattleError::MissingRecord {
        battle_id: target.battle_id.clone(),
        location: target.location,
        reason,
    };
    let tile = snapshot.tile(target.location).ok_or_else(|| missing("tile not found"))?;
    let original = tile
        .battles
        .get(&target.battle_id)
        .ok_or_else(|| missing("battle not found"))?;
    if original.status == BattleStatus::Resolved {
        return Err(missing("battle already resolved"));
    }

    let mut battle = original.clone();
    repair_roster(&mut battle, tile);

    let scene = Scene {
        battle_id: &battle.id,
        tile,
        players: &snapshot.players,
        tick,
        now_ms,
    };
    let location = tile.location;
    let mut chronicle = Chronicle::new(tick, location);
    let mut batch = UpdateBatch::new();
    let mut pool = LootPool::new();

    let mut groups: SidePair<BTreeMap<GroupId, Group>> = SidePair::default().map(|side, _: ()| {
        battle
            .side(side)
            .groups
            .iter()
            .filter_map(|id| tile.groups.get(id))
            .map(|g| (g.id.clone(), g.clone()))
            .collect()
    });

    // --- Structure involvement ---
    let mut linked_structure = tile
        .structure
        .clone()
        .filter(|s| battle.targets_structure() && s.battle_id.as_ref() == Some(&battle.id));
    let defender = linked_structure
        .as_ref()
        .map(|s| defending_side(s, &battle, tile));
    let structure_for = |side: BattleSide, s: Option<&Structure>| -> Option<Structure> {
        if defender == Some(side) { s.cloned() } else { None }
    };

    // --- Flee ---
    let mut fled = 0_usize;
    for side in [BattleSide::Side1, BattleSide::Side2] {
        let gone = SideProcessor::new(&scene, side).withdraw_fleeing(
            groups.get_mut(side),
            &mut chronicle,
            &mut batch,
        )?;
        fled = fled.saturating_add(gone.len());
    }

    // --- Critical hits ---
    let tally: CritTally = attrition::mark_critical_hits(&mut groups, config.crit_chance, rng);
    for side in [BattleSide::Side1, BattleSide::Side2] {
        for hit in tally.hits.get(side) {
            chronicle.log(BattleEventKind::CriticalHit, events::critical_hit(&hit.name, hit.combo));
        }
    }

    // --- Power ---
    let base_power = SidePair::new(
        power::side_power(
            groups.side1.values(),
            structure_for(BattleSide::Side1, linked_structure.as_ref()).as_ref(),
        ),
        power::side_power(
            groups.side2.values(),
            structure_for(BattleSide::Side2, linked_structure.as_ref()).as_ref(),
        ),
    );
    let jittered = SidePair::new(
        power::jitter(base_power.side1, config.jitter, rng),
        power::jitter(base_power.side2, config.jitter, rng),
    );
    if !jittered.side1.is_finite() || !jittered.side2.is_finite() {
        return Err(BattleError::Computation {
            battle_id: battle.id.clone(),
            context: format!("non-finite power {} / {}", jittered.side1, jittered.side2),
        });
    }

    // --- Attrition ---
    let Attrition {
        casualties: attrition,
        stalemate,
    } = attrition::compute_attrition(jittered, config, rng);
    if let Some(tie) = &stalemate {
        chronicle.log(
            BattleEventKind::StalemateBreak,
            events::stalemate_break(&side_name(&battle, tie.loser), tie.casualties),
        );
        debug!(
            battle_id = %battle.id,
            loser = %tie.loser,
            casualties = tie.casualties,
            chance = tie.stronger_win_chance,
            "Stalemate broken"
        );
    }

    // --- Casualties ---
    let names = SidePair::new(
        combatant_names(&groups.side1, structure_for(BattleSide::Side1, linked_structure.as_ref()).as_ref()),
        combatant_names(&groups.side2, structure_for(BattleSide::Side2, linked_structure.as_ref()).as_ref()),
    );
    let mut results: SidePair<SideOutcome> = SidePair::default();
    for side in [BattleSide::Side1, BattleSide::Side2] {
        let opposition = Opposition {
            hits: tally.hits.get(side.opponent()),
            combatants: names.get(side.opponent()),
        };
        *results.get_mut(side) = SideProcessor::new(&scene, side).apply(
            groups.get_mut(side),
            *attrition.get(side),
            battle.side(side).casualties,
            opposition,
            &tally.changed,
            &mut pool,
            &mut chronicle,
            &mut batch,
            rng,
        )?;
    }

    // --- Structure damage ---
    let mut structure_hit = None;
    if let (Some(structure), Some(defender)) = (linked_structure.as_mut(), defender) {
        let attacker_power = *jittered.get(defender.opponent());
        let hit = structure::apply_damage(structure, attacker_power, battle.tick_count == 0, config);
        structure::record_damage(&scene, structure, hit, defender, &mut pool, &mut chronicle, &mut batch)?;
        structure_hit = Some(hit);
        if hit.destroyed {
            linked_structure = None;
        }
    }

    // --- Outcome ---
    let standing = SidePair::default().map(|side, _: ()| {
        let result = results.get(side);
        let defended = defender == Some(side);
        let structure_power = if defended {
            linked_structure
                .as_ref()
                .map_or(0, |s| power::structure_power(s.kind))
        } else {
            0
        };
        // Unit strengths are u32 sums; far inside f64's exact range.
        #[allow(clippy::cast_precision_loss)]
        let power = result.remaining_power.saturating_add(structure_power) as f64;
        Standing {
            survivors: result.survivors.len(),
            structure_holds: defended.then(|| structure::holds(linked_structure.as_ref(), config)),
            crits: tally.count(side),
            power,
        }
    });
    let ticks = battle.tick_count.saturating_add(1);
    let total_casualties = results
        .side1
        .total_casualties
        .saturating_add(results.side2.total_casualties);
    let decision = outcome::decide(standing, ticks, total_casualties, config, rng);

    let applied = SidePair::new(results.side1.applied, results.side2.applied);
    if applied.side1 > 0 || applied.side2 > 0 {
        chronicle.record(
            BattleEventKind::Casualties,
            events::casualties(
                &side_name(&battle, BattleSide::Side1),
                applied.side1,
                &side_name(&battle, BattleSide::Side2),
                applied.side2,
                location,
            ),
        );
    }

    let loot = if decision.outcome.is_terminal() {
        finish(
            &scene,
            &battle,
            decision,
            &mut groups,
            linked_structure.as_mut(),
            defender,
            pool,
            &mut chronicle,
            &mut batch,
            rng,
        )?
    } else {
        // The pool does not outlive the tick; anything dropped mid-battle
        // lands on the tile.
        let dropped = if pool.is_empty() {
            None
        } else {
            let drop = loot::deliver_to_tile(pool, tile, &mut batch)?;
            chronicle.record(BattleEventKind::Other, events::scattered(drop.count, location));
            Some(drop)
        };
        persist(&battle, tile, &results, ticks, &mut chronicle, config, &mut batch)?;
        dropped
    };

    for event in chronicle.world_events(now_ms) {
        batch.set(layout::event(&EventId::new()), &event)?;
    }

    let report = BattleReport {
        battle_id: battle.id.clone(),
        location,
        outcome: decision.outcome,
        forced: decision.forced,
        power: jittered,
        casualties: applied,
        crits: SidePair::new(tally.count(BattleSide::Side1), tally.count(BattleSide::Side2)),
        units_after: SidePair::new(results.side1.units_after, results.side2.units_after),
        deaths: results.side1.deaths.len().saturating_add(results.side2.deaths.len()),
        fled,
        stalemate_break: stalemate.is_some(),
        structure: structure_hit,
        loot,
    };
    debug!(battle_id = %battle.id, tick, ops = batch.len(), outcome = ?report.outcome, "Battle tick resolved");
    Ok(Resolution { batch, report })
}

/// Continuing battle: write back rosters, counters, tick count and log.
fn persist(
    battle: &Battle,
    tile: &Tile,
    results: &SidePair<SideOutcome>,
    ticks: u32,
    chronicle: &mut Chronicle,
    config: &BattleConfig,
    batch: &mut UpdateBatch,
) -> Result<(), BattleError> {
    let mut next = battle.clone();
    for side in [BattleSide::Side1, BattleSide::Side2] {
        let result = results.get(side);
        let path = layout::battle_field(tile, &battle.id, side.field());
        let record = next.side_mut(side);
        record.groups = result.survivors.iter().cloned().collect::<BTreeSet<_>>();
        record.casualties = result.total_casualties;
        batch.set(path, record)?;
    }
    next.tick_count = ticks;
    next.events.append(&mut chronicle.battle);
    events::trim_log(&mut next.events, config.event_log_limit);
    batch.set(layout::battle_field(tile, &next.id, "tickCount"), &next.tick_count)?;
    batch.set(layout::battle_field(tile, &next.id, "events"), &next.events)?;
    Ok(())
}

/// Terminal battle: forfeits, structure, loot, cleanup and deletion.
#[allow(clippy::too_many_arguments)]
fn finish(
    scene: &Scene<'_>,
    battle: &Battle,
    decision: Decision,
    groups: &mut SidePair<BTreeMap<GroupId, Group>>,
    structure: Option<&mut Structure>,
    defender: Option<BattleSide>,
    mut pool: LootPool,
    chronicle: &mut Chronicle,
    batch: &mut UpdateBatch,
    rng: &mut impl Rng,
) -> Result<Option<LootDrop>, BattleError> {
    let tile = scene.tile;
    let location = tile.location;
    let winner = decision.outcome.winner();

    // Surviving losers of an imposed outcome give up what they carry.
    if let (true, Some(winner)) = (decision.forced, winner) {
        let loser = winner.opponent();
        for group in groups.get_mut(loser).values_mut() {
            if group.items.is_empty() {
                continue;
            }
            pool.collect(std::mem::take(&mut group.items).into_values(), loser);
            batch.set(layout::group_items(tile, &group.id), &group.items)?;
        }
    }

    if let (Some(structure), Some(defender)) = (structure, defender) {
        if winner == Some(defender.opponent()) {
            structure::capture_or_raze(
                scene,
                structure,
                groups.get(defender.opponent()).values(),
                defender,
                &mut pool,
                chronicle,
                batch,
            )?;
        } else {
            structure::release(scene, batch);
        }
    }

    let mut delivered = None;
    if !pool.is_empty() {
        let survivors: Vec<GroupId> = winner
            .map(|w| groups.get(w).keys().cloned().collect())
            .unwrap_or_default();
        let recipient = loot::choose_recipient(&survivors, rng).cloned();
        let drop = match (recipient, winner) {
            (Some(id), Some(w)) => match groups.get_mut(w).get_mut(&id) {
                Some(group) => {
                    let name = group.display_name().to_owned();
                    let drop = loot::deliver_to_group(pool, group, tile, batch)?;
                    chronicle.record(BattleEventKind::Other, events::looted(&name, drop.count));
                    drop
                }
                None => loot::deliver_to_tile(pool, tile, batch)?,
            },
            _ => {
                let drop = loot::deliver_to_tile(pool, tile, batch)?;
                chronicle.record(BattleEventKind::Other, events::scattered(drop.count, location));
                drop
            }
        };
        delivered = Some(drop);
    }

    for side in [BattleSide::Side1, BattleSide::Side2] {
        let result = match winner {
            Some(w) if w == side => "victory",
            Some(_) => "defeat",
            None => "draw",
        };
        for group in groups.get(side).values() {
            release_group(scene, group, batch)?;
            for player in group.player_ids() {
                notify(scene, &player, events::battle_over_message(result, location), batch)?;
            }
        }
    }

    batch.delete(layout::battle(tile, &battle.id));
    let text = match winner {
        Some(w) => events::victory(&side_name(battle, w), &side_name(battle, w.opponent()), location),
        None => events::draw(location),
    };
    chronicle.announce(text);

    info!(
        battle_id = %battle.id,
        x = location.x,
        y = location.y,
        outcome = ?decision.outcome,
        forced = decision.forced,
        "Battle ended"
    );
    Ok(delivered)
}
