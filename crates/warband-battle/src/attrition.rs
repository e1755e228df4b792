//! Casualty counts from two sides' power, and PvP critical hits.
//!
//! ```text
//! ratio(side)     = opposing / (side + opposing)
//! attrition(side) = round(side * ratio(side) * base_coefficient)
//! ```
//!
//! When both sides would lose nobody while both still have power, the
//! stalemate guard forces casualties onto one side with a coin biased
//! toward the stronger side winning.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use warband_types::{BattleSide, Group, GroupId, UnitId};

use crate::config::BattleConfig;
use crate::power::SidePair;

// ---------------------------------------------------------------------------
// Attrition
// ---------------------------------------------------------------------------

/// Casualties each side suffers this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Attrition {
    /// Casualties per side.
    pub casualties: SidePair<u32>,
    /// Set when the stalemate guard chose the casualties.
    pub stalemate: Option<StalemateBreak>,
}

/// Record of a forced tie-break.
#[derive(Debug, Clone, PartialEq)]
pub struct StalemateBreak {
    /// The side that takes the forced casualties.
    pub loser: BattleSide,
    /// Number of forced casualties.
    pub casualties: u32,
    /// Probability the stronger side had of winning the coin.
    pub stronger_win_chance: f64,
}

/// Round a non-negative quantity to a count. Non-finite or negative input
/// counts as zero.
pub fn to_count(value: f64) -> u32 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let rounded = value.round();
    if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let count = rounded as u32;
        count
    }
}

/// Casualties `side_power` suffers against `opposing_power`.
///
/// Zero when the opposing side has no power; otherwise grows with it.
pub fn side_attrition(side_power: f64, opposing_power: f64, coefficient: f64) -> u32 {
    let total = side_power + opposing_power;
    if total <= 0.0 {
        return 0;
    }
    let ratio = opposing_power / total;
    to_count(side_power * ratio * coefficient)
}

/// Chance the stronger side wins the stalemate coin, always a probability
/// in `[0.5, 1]` whatever the configured bias.
pub fn stronger_win_chance(power1: f64, power2: f64, config: &BattleConfig) -> f64 {
    let strongest = power1.max(power2);
    let gap = if strongest > 0.0 {
        (power1 - power2).abs() / strongest
    } else {
        0.0
    };
    let ceiling = if config.stalemate_bias_max.is_nan() {
        0.5
    } else {
        config.stalemate_bias_max.clamp(0.5, 1.0)
    };
    let chance = config.stalemate_bias_scale.mul_add(gap, 0.5);
    if chance.is_finite() {
        chance.clamp(0.5, ceiling)
    } else {
        0.5
    }
}

/// Compute both sides' casualties from their (jittered) power.
pub fn compute_attrition(
    power: SidePair<f64>,
    config: &BattleConfig,
    rng: &mut impl Rng,
) -> Attrition {
    let casualties = SidePair::new(
        side_attrition(power.side1, power.side2, config.base_coefficient),
        side_attrition(power.side2, power.side1, config.base_coefficient),
    );

    let deadlocked = casualties.side1 == 0
        && casualties.side2 == 0
        && power.side1 > 0.0
        && power.side2 > 0.0;
    if !deadlocked {
        return Attrition {
            casualties,
            stalemate: None,
        };
    }

    let (stronger, weaker_power) = if power.side1 >= power.side2 {
        (BattleSide::Side1, power.side2)
    } else {
        (BattleSide::Side2, power.side1)
    };
    let forced = to_count(weaker_power * config.stalemate_force_fraction).max(1);
    let chance = stronger_win_chance(power.side1, power.side2, config);
    let loser = if rng.random_bool(chance) {
        stronger.opponent()
    } else {
        stronger
    };

    let mut casualties = SidePair::new(0, 0);
    *casualties.get_mut(loser) = forced;
    Attrition {
        casualties,
        stalemate: Some(StalemateBreak {
            loser,
            casualties: forced,
            stronger_win_chance: chance,
        }),
    }
}

// ---------------------------------------------------------------------------
// Critical hits
// ---------------------------------------------------------------------------

/// One critical hit landed this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalHit {
    /// Group of the attacking unit.
    pub group: GroupId,
    /// The attacking unit.
    pub unit: UnitId,
    /// Display name of the attacking unit.
    pub name: String,
    /// The opposing player unit the hit landed on.
    pub target: UnitId,
    /// The unit also landed a critical hit last tick.
    pub combo: bool,
}

/// Critical hits per side, plus which groups had unit flags changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CritTally {
    /// Hits landed by each side.
    pub hits: SidePair<Vec<CriticalHit>>,
    /// Groups whose unit flags changed and must be written back.
    pub changed: BTreeSet<GroupId>,
}

impl CritTally {
    /// Number of hits a side landed.
    pub fn count(&self, side: BattleSide) -> usize {
        self.hits.get(side).len()
    }
}

fn player_units(groups: &BTreeMap<GroupId, Group>) -> Vec<UnitId> {
    groups
        .values()
        .flat_map(|g| g.units.values().filter(|u| u.is_player()).map(|u| u.id.clone()))
        .collect()
}

/// Roll critical hits for every player unit when both sides field players.
///
/// A hit sets `criticalHit` and a random opposing player unit as
/// `targetId`; a repeat hit from last tick also sets `comboCritical`.
/// Every other unit has its flags cleared.
pub fn mark_critical_hits(
    groups: &mut SidePair<BTreeMap<GroupId, Group>>,
    crit_chance: f64,
    rng: &mut impl Rng,
) -> CritTally {
    let targets = SidePair::new(player_units(&groups.side1), player_units(&groups.side2));
    let pvp = !targets.side1.is_empty() && !targets.side2.is_empty();
    let chance = if crit_chance.is_nan() { 0.0 } else { crit_chance.clamp(0.0, 1.0) };

    let mut tally = CritTally::default();
    for side in [BattleSide::Side1, BattleSide::Side2] {
        let opposing = targets.get(side.opponent());
        for group in groups.get_mut(side).values_mut() {
            for unit in group.units.values_mut() {
                let landed = if pvp && unit.is_player() && rng.random_bool(chance) {
                    let pick = rng.random_range(0..opposing.len());
                    opposing.get(pick).cloned()
                } else {
                    None
                };

                let before = (unit.critical_hit, unit.combo_critical, unit.target_id.clone());
                if let Some(target) = landed {
                    let combo = unit.critical_hit;
                    unit.combo_critical = combo;
                    unit.critical_hit = true;
                    unit.target_id = Some(target.clone());
                    tally.hits.get_mut(side).push(CriticalHit {
                        group: group.id.clone(),
                        unit: unit.id.clone(),
                        name: unit.display_name().to_owned(),
                        target,
                        combo,
                    });
                } else {
                    unit.critical_hit = false;
                    unit.combo_critical = false;
                    unit.target_id = None;
                }
                if before != (unit.critical_hit, unit.combo_critical, unit.target_id.clone()) {
                    tally.changed.insert(group.id.clone());
                }
            }
        }
    }
    tally
}
