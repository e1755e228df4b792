//! Combat power for units, groups, structures and whole sides.
//!
//! Power is an integer sum of unit strengths. Jitter is applied last, per
//! side, and is the only place power becomes fractional.

use rand::Rng;

use warband_types::{BattleSide, Group, Structure, StructureKind, Unit};

/// A value held once per battle side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SidePair<T> {
    /// Value for side 1.
    pub side1: T,
    /// Value for side 2.
    pub side2: T,
}

impl<T> SidePair<T> {
    /// Build a pair from both values.
    pub const fn new(side1: T, side2: T) -> Self {
        Self { side1, side2 }
    }

    /// The value for `side`.
    pub const fn get(&self, side: BattleSide) -> &T {
        match side {
            BattleSide::Side1 => &self.side1,
            BattleSide::Side2 => &self.side2,
        }
    }

    /// Mutable value for `side`.
    pub const fn get_mut(&mut self, side: BattleSide) -> &mut T {
        match side {
            BattleSide::Side1 => &mut self.side1,
            BattleSide::Side2 => &mut self.side2,
        }
    }

    /// Apply `f` to both values.
    pub fn map<U>(self, mut f: impl FnMut(BattleSide, T) -> U) -> SidePair<U> {
        SidePair {
            side1: f(BattleSide::Side1, self.side1),
            side2: f(BattleSide::Side2, self.side2),
        }
    }
}

/// Strength of one unit; a unit without a strength counts as 1.
pub fn unit_strength(unit: &Unit) -> u64 {
    unit.strength.map_or(1, u64::from)
}

/// Sum of unit strengths. A group with any unit has power of at least 1;
/// an empty group has none.
pub fn group_power(group: &Group) -> u64 {
    if group.units.is_empty() {
        return 0;
    }
    group
        .units
        .values()
        .map(unit_strength)
        .fold(0_u64, u64::saturating_add)
        .max(1)
}

/// Fixed defensive power contributed by a structure of this type.
pub const fn structure_power(kind: StructureKind) -> u64 {
    match kind {
        StructureKind::Spawn => 15,
        StructureKind::Camp => 2,
        StructureKind::Outpost | StructureKind::Unknown => 5,
        StructureKind::Village => 10,
        StructureKind::Stronghold => 20,
        StructureKind::Fortress => 40,
    }
}

/// Total power of one side.
///
/// `structure` is only passed for the side a linked structure defends.
pub fn side_power<'a>(
    groups: impl IntoIterator<Item = &'a Group>,
    structure: Option<&Structure>,
) -> u64 {
    let groups = groups
        .into_iter()
        .map(group_power)
        .fold(0_u64, u64::saturating_add);
    groups.saturating_add(structure.map_or(0, |s| structure_power(s.kind)))
}

/// Scale `power` by `1 + U(-amount, +amount)`.
pub fn jitter(power: u64, amount: f64, rng: &mut impl Rng) -> f64 {
    let amount = if amount.is_finite() { amount.abs() } else { 0.0 };
    let factor = 1.0 + rng.random_range(-amount..=amount);
    #[allow(clippy::cast_precision_loss)]
    let base = power as f64;
    base * factor
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use serde_json::json;

    use super::*;

    fn group(units: serde_json::Value) -> Group {
        serde_json::from_value(json!({"id": "g", "units": units})).unwrap()
    }

    #[test]
    fn strength_defaults_to_one() {
        let g = group(json!([{"id": "a"}, {"id": "b", "strength": 4}]));
        assert_eq!(group_power(&g), 5);
    }

    #[test]
    fn empty_group_has_no_power_and_zero_strength_floors_at_one() {
        assert_eq!(group_power(&group(json!([]))), 0);
        assert_eq!(group_power(&group(json!([{"id": "a", "strength": 0}]))), 1);
    }

    #[test]
    fn structure_adds_to_defending_side() {
        let g = group(json!([{"id": "a", "strength": 3}]));
        let fort: Structure = serde_json::from_value(json!({"type": "fortress"})).unwrap();
        assert_eq!(side_power([&g], None), 3);
        assert_eq!(side_power([&g], Some(&fort)), 43);
        assert_eq!(side_power(std::iter::empty(), Some(&fort)), 40);
    }

    #[test]
    fn jitter_stays_within_band() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..1000 {
            let value = jitter(100, 0.025, &mut rng);
            assert!((97.5..=102.5).contains(&value));
        }
        assert!(jitter(0, 0.025, &mut rng).abs() < f64::EPSILON);
    }
}
