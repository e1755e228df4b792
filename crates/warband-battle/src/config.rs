//! Tunable constants for battle resolution.
//!
//! Mirrors the `battle:` section of `warband-config.yaml`. Every field has
//! a default, so an empty section yields the stock rules.

use serde::Deserialize;

/// Combat tunables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BattleConfig {
    /// Fraction of a side's power lost per tick against an equal opponent
    /// share (`attrition = power * ratio * coefficient`).
    #[serde(default = "default_base_coefficient")]
    pub base_coefficient: f64,

    /// Half-width of the per-side power jitter (0.025 = +-2.5%).
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Fraction of the weaker side's power forced as casualties when both
    /// sides would otherwise lose nobody.
    #[serde(default = "default_stalemate_force_fraction")]
    pub stalemate_force_fraction: f64,

    /// How strongly the power gap biases the stalemate coin.
    #[serde(default = "default_stalemate_bias_scale")]
    pub stalemate_bias_scale: f64,

    /// Upper bound on the stronger side's chance to win the stalemate coin.
    #[serde(default = "default_stalemate_bias_max")]
    pub stalemate_bias_max: f64,

    /// Per-unit chance of a critical hit in player-versus-player fights.
    #[serde(default = "default_crit_chance")]
    pub crit_chance: f64,

    /// A defending structure below this fraction of max health no longer
    /// keeps its side in the fight.
    #[serde(default = "default_defeated_structure_fraction")]
    pub defeated_structure_fraction: f64,

    /// Ticks before the long-stalemate guard may force an outcome.
    #[serde(default = "default_long_stalemate_ticks")]
    pub long_stalemate_ticks: u32,

    /// Power share at which a side wins a forced outcome outright.
    #[serde(default = "default_dominance_threshold")]
    pub dominance_threshold: f64,

    /// Chance that a forced outcome without a dominant side is a draw.
    #[serde(default = "default_forced_draw_chance")]
    pub forced_draw_chance: f64,

    /// Structure damage per tick as a fraction of durability at ratio 1.
    #[serde(default = "default_structure_damage_fraction")]
    pub structure_damage_fraction: f64,

    /// Per-tick damage cap as a fraction of durability at ratio <= 1.
    #[serde(default = "default_structure_cap_floor")]
    pub structure_cap_floor: f64,

    /// Additional cap fraction reached as the power ratio grows.
    #[serde(default = "default_structure_cap_span")]
    pub structure_cap_span: f64,

    /// Entries kept in a battle's own event log.
    #[serde(default = "default_event_log_limit")]
    pub event_log_limit: usize,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            base_coefficient: default_base_coefficient(),
            jitter: default_jitter(),
            stalemate_force_fraction: default_stalemate_force_fraction(),
            stalemate_bias_scale: default_stalemate_bias_scale(),
            stalemate_bias_max: default_stalemate_bias_max(),
            crit_chance: default_crit_chance(),
            defeated_structure_fraction: default_defeated_structure_fraction(),
            long_stalemate_ticks: default_long_stalemate_ticks(),
            dominance_threshold: default_dominance_threshold(),
            forced_draw_chance: default_forced_draw_chance(),
            structure_damage_fraction: default_structure_damage_fraction(),
            structure_cap_floor: default_structure_cap_floor(),
            structure_cap_span: default_structure_cap_span(),
            event_log_limit: default_event_log_limit(),
        }
    }
}

const fn default_base_coefficient() -> f64 {
    0.1
}

const fn default_jitter() -> f64 {
    0.025
}

const fn default_stalemate_force_fraction() -> f64 {
    0.1
}

const fn default_stalemate_bias_scale() -> f64 {
    0.3
}

const fn default_stalemate_bias_max() -> f64 {
    0.8
}

const fn default_crit_chance() -> f64 {
    0.1
}

const fn default_defeated_structure_fraction() -> f64 {
    0.15
}

const fn default_long_stalemate_ticks() -> u32 {
    10
}

const fn default_dominance_threshold() -> f64 {
    0.8
}

const fn default_forced_draw_chance() -> f64 {
    0.4
}

const fn default_structure_damage_fraction() -> f64 {
    0.1
}

const fn default_structure_cap_floor() -> f64 {
    0.25
}

const fn default_structure_cap_span() -> f64 {
    0.5
}

const fn default_event_log_limit() -> usize {
    50
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: BattleConfig =
            serde_json::from_value(serde_json::json!({"crit_chance": 0.2})).unwrap();
        assert_eq!(config.crit_chance, 0.2);
        assert_eq!(config.base_coefficient, 0.1);
        assert_eq!(config.event_log_limit, 50);
    }
}
