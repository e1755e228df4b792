//! Battle outcome state machine.
//!
//! ```text
//! Active --(one side defeated)------------------> Victory(other)
//!        --(both defeated, crits break the tie)--> Victory(critter)
//!        --(both defeated)----------------------> Draw
//!        --(long stalemate, dominant side)------> Victory(dominant)   [forced]
//!        --(long stalemate, no dominant side)---> roll Draw/Victory   [forced]
//!        --(otherwise)--------------------------> Continuing
//! ```

use rand::Rng;

use warband_types::BattleSide;

use crate::config::BattleConfig;
use crate::power::SidePair;

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The battle goes on.
    Continuing,
    /// One side won.
    Victory(BattleSide),
    /// Nobody won.
    Draw,
}

impl Outcome {
    /// Whether the battle ends this tick.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Continuing)
    }

    /// The winning side, if any.
    pub const fn winner(self) -> Option<BattleSide> {
        match self {
            Self::Victory(side) => Some(side),
            Self::Continuing | Self::Draw => None,
        }
    }
}

/// Outcome plus how it was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// The outcome.
    pub outcome: Outcome,
    /// Set when the long-stalemate guard imposed the outcome.
    pub forced: bool,
}

/// One side's position after casualties.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Standing {
    /// Groups still in the fight.
    pub survivors: usize,
    /// For the side a structure defends: whether it still holds.
    pub structure_holds: Option<bool>,
    /// Critical hits landed this tick.
    pub crits: usize,
    /// Remaining power, structure included.
    pub power: f64,
}

impl Standing {
    /// No groups left and no structure holding out.
    pub fn is_defeated(&self) -> bool {
        self.survivors == 0 && !self.structure_holds.unwrap_or(false)
    }
}

/// Whether the long-stalemate guard fires.
///
/// `ticks` counts the tick being resolved.
pub fn long_stalemate(ticks: u32, total_casualties: u32, config: &BattleConfig) -> bool {
    ticks >= config.long_stalemate_ticks && f64::from(total_casualties) < f64::from(ticks) / 2.0
}

/// Decide the outcome of this tick.
pub fn decide(
    standing: SidePair<Standing>,
    ticks: u32,
    total_casualties: u32,
    config: &BattleConfig,
    rng: &mut impl Rng,
) -> Decision {
    let defeated = SidePair::new(standing.side1.is_defeated(), standing.side2.is_defeated());
    let decided = |outcome| Decision {
        outcome,
        forced: false,
    };

    match (defeated.side1, defeated.side2) {
        (true, false) => return decided(Outcome::Victory(BattleSide::Side2)),
        (false, true) => return decided(Outcome::Victory(BattleSide::Side1)),
        (true, true) => {
            let crits = (standing.side1.crits > 0, standing.side2.crits > 0);
            return decided(match crits {
                (true, false) => Outcome::Victory(BattleSide::Side1),
                (false, true) => Outcome::Victory(BattleSide::Side2),
                _ => Outcome::Draw,
            });
        }
        (false, false) => {}
    }

    if !long_stalemate(ticks, total_casualties, config) {
        return decided(Outcome::Continuing);
    }

    let total = standing.side1.power + standing.side2.power;
    if total > 0.0 {
        for side in [BattleSide::Side1, BattleSide::Side2] {
            if standing.get(side).power / total >= config.dominance_threshold {
                return Decision {
                    outcome: Outcome::Victory(side),
                    forced: true,
                };
            }
        }
    }

    let draw = config.forced_draw_chance.clamp(0.0, 1.0);
    let roll: f64 = rng.random();
    let outcome = if roll < draw {
        Outcome::Draw
    } else if roll < draw + (1.0 - draw) / 2.0 {
        Outcome::Victory(BattleSide::Side1)
    } else {
        Outcome::Victory(BattleSide::Side2)
    };
    Decision {
        outcome,
        forced: true,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn standing(survivors: usize, crits: usize, power: f64) -> Standing {
        Standing {
            survivors,
            structure_holds: None,
            crits,
            power,
        }
    }

    #[test]
    fn one_side_defeated() {
        let mut rng = SmallRng::seed_from_u64(0);
        let config = BattleConfig::default();
        let decision = decide(
            SidePair::new(standing(0, 0, 0.0), standing(1, 0, 10.0)),
            1,
            0,
            &config,
            &mut rng,
        );
        assert_eq!(decision.outcome, Outcome::Victory(BattleSide::Side2));
        assert!(!decision.forced);
    }

    #[test]
    fn mutual_wipe_goes_to_the_critter() {
        let mut rng = SmallRng::seed_from_u64(0);
        let config = BattleConfig::default();
        let outcome = |c1, c2, rng: &mut SmallRng| {
            decide(SidePair::new(standing(0, c1, 0.0), standing(0, c2, 0.0)), 3, 9, &config, rng)
                .outcome
        };
        assert_eq!(outcome(1, 0, &mut rng), Outcome::Victory(BattleSide::Side1));
        assert_eq!(outcome(0, 2, &mut rng), Outcome::Victory(BattleSide::Side2));
        assert_eq!(outcome(1, 1, &mut rng), Outcome::Draw);
        assert_eq!(outcome(0, 0, &mut rng), Outcome::Draw);
    }

    #[test]
    fn standing_structure_keeps_side_alive() {
        let defended = Standing {
            survivors: 0,
            structure_holds: Some(true),
            crits: 0,
            power: 10.0,
        };
        assert!(!defended.is_defeated());
        let fallen = Standing {
            structure_holds: Some(false),
            ..defended
        };
        assert!(fallen.is_defeated());
    }

    #[test]
    fn long_stalemate_needs_ticks_and_few_casualties() {
        let config = BattleConfig::default();
        assert!(!long_stalemate(9, 0, &config));
        assert!(long_stalemate(10, 4, &config));
        assert!(!long_stalemate(10, 5, &config));
    }

    #[test]
    fn dominant_side_wins_forced_outcome() {
        let mut rng = SmallRng::seed_from_u64(0);
        let config = BattleConfig::default();
        let decision = decide(
            SidePair::new(standing(2, 0, 90.0), standing(1, 0, 10.0)),
            12,
            1,
            &config,
            &mut rng,
        );
        assert_eq!(decision.outcome, Outcome::Victory(BattleSide::Side1));
        assert!(decision.forced);
    }

    #[test]
    fn balanced_forced_outcome_is_terminal() {
        let mut rng = SmallRng::seed_from_u64(0);
        let config = BattleConfig::default();
        let mut draws = 0;
        for _ in 0..1000 {
            let decision = decide(
                SidePair::new(standing(1, 0, 10.0), standing(1, 0, 10.0)),
                12,
                0,
                &config,
                &mut rng,
            );
            assert!(decision.forced);
            assert!(decision.outcome.is_terminal());
            if decision.outcome == Outcome::Draw {
                draws += 1;
            }
        }
        assert!((320..480).contains(&draws));
    }
}
