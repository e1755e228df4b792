//! Multi-tick battle scenarios run against an in-memory world tree.

#![allow(missing_docs)]
#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde_json::{Value, json};

use warband_battle::{BattleConfig, BattleRef, BattleReport, Outcome, resolve_battle};
use warband_types::{BattleId, BattleSide, Location, PlayerId, WorldSnapshot};

const LOCATION: Location = Location::new(2, 3);

fn target() -> BattleRef {
    BattleRef {
        location: LOCATION,
        battle_id: BattleId::from("b1"),
    }
}

fn world(tile: Value) -> Value {
    json!({"chunks": {"0,0": {"2,3": tile}}, "players": {}})
}

/// Resolve one tick and apply its batch to `tree`.
fn step(tree: &mut Value, tick: u64, config: &BattleConfig, rng: &mut SmallRng) -> BattleReport {
    let snapshot = WorldSnapshot::from_tree(tree);
    let resolution = resolve_battle(&snapshot, &target(), tick, 1_000, config, rng).unwrap();
    resolution.batch.into_plan().apply_to(tree);
    resolution.report
}

fn single_unit_groups(prefix: &str, count: usize) -> Vec<(String, Value)> {
    (0..count)
        .map(|i| {
            let id = format!("{prefix}{i}");
            let group = json!({"name": id, "status": "fighting", "battleId": "b1", "units": [{"id": format!("{id}-u")}]});
            (id, group)
        })
        .collect()
}

#[test]
fn stalemate_guard_breaks_a_deadlock() {
    let mut groups = serde_json::Map::new();
    let mut sides = (Vec::new(), Vec::new());
    for (id, group) in single_unit_groups("a", 5) {
        sides.0.push(id.clone());
        groups.insert(id, group);
    }
    for (id, group) in single_unit_groups("d", 5) {
        sides.1.push(id.clone());
        groups.insert(id, group);
    }
    let mut tree = world(json!({
        "groups": groups,
        "battles": {"b1": {"side1": {"groups": sides.0}, "side2": {"groups": sides.1}}}
    }));

    let config = BattleConfig::default();
    let mut rng = SmallRng::seed_from_u64(42);
    let mut first_casualty = None;
    let mut ended = None;
    for tick in 1..=15 {
        let report = step(&mut tree, tick, &config, &mut rng);
        if first_casualty.is_none() && report.casualties.side1 + report.casualties.side2 > 0 {
            first_casualty = Some(tick);
        }
        if report.outcome.is_terminal() {
            ended = Some(tick);
            break;
        }
    }
    assert!(first_casualty.unwrap() <= 10);
    assert!(ended.unwrap() <= 15);

    let snapshot = WorldSnapshot::from_tree(&tree);
    assert_eq!(snapshot.battle_count(), 0);
}

#[test]
fn lone_players_at_equal_power_settle_in_the_stalemate_window() {
    let player_group = |id: &str, player: &str, name: &str| {
        json!({"name": name, "owner": player, "status": "fighting", "battleId": "b1",
               "units": [{"id": format!("{id}-u"), "type": "player", "player": player, "name": name, "strength": 5}]})
    };
    let start = json!({
        "chunks": {"0,0": {"2,3": {
            "groups": {"ash": player_group("ash", "p1", "Ash"), "wren": player_group("wren", "p2", "Wren")},
            "battles": {"b1": {"side1": {"name": "Ash", "groups": ["ash"]}, "side2": {"name": "Wren", "groups": ["wren"]}}}
        }}},
        "players": {
            "p1": {"displayName": "Ash", "alive": true, "inGroup": "ash"},
            "p2": {"displayName": "Wren", "alive": true, "inGroup": "wren"}
        }
    });
    let config = BattleConfig::default();

    for seed in 0..16 {
        let mut tree = start.clone();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut first_casualty = None;
        let mut deaths = 0;
        let mut ended = None;
        for tick in 1..=15 {
            let report = step(&mut tree, tick, &config, &mut rng);
            assert!(report.power.side1 > 4.8 && report.power.side1 < 5.2);
            deaths += report.deaths;
            if first_casualty.is_none() && report.casualties.side1 + report.casualties.side2 > 0 {
                first_casualty = Some(tick);
            }
            if report.outcome.is_terminal() {
                ended = Some(report.outcome);
                break;
            }
        }
        assert!(first_casualty.unwrap() <= 10, "seed {seed}");
        let Some(Outcome::Victory(winner)) = ended else {
            panic!("seed {seed}: no winner by tick 15");
        };
        assert_eq!(deaths, 1, "seed {seed}");

        let (survivor, fallen) = match winner {
            BattleSide::Side1 => ("p1", "p2"),
            BattleSide::Side2 => ("p2", "p1"),
        };
        assert_eq!(tree["players"][fallen]["alive"], json!(false));
        assert_eq!(tree["players"][survivor]["alive"], json!(true));
        assert_eq!(WorldSnapshot::from_tree(&tree).battle_count(), 0);
    }
}

#[test]
fn structure_survives_the_first_tick() {
    let mut tree = world(json!({
        "groups": {
            "raiders": {"name": "Raiders", "owner": "p1", "status": "fighting", "battleId": "b1",
                        "units": [{"id": "r1", "strength": 50}]},
            "guards": {"name": "Guards", "status": "fighting", "battleId": "b1", "battleRole": "defender",
                       "units": [{"id": "g1", "strength": 1}, {"id": "g2", "strength": 1}]}
        },
        "structure": {"id": "s1", "type": "camp", "health": 100, "battleId": "b1"},
        "battles": {"b1": {
            "side1": {"name": "Raiders", "groups": ["raiders"]},
            "side2": {"name": "Camp", "groups": ["guards"]},
            "targetTypes": ["group", "structure"]
        }}
    }));
    let config = BattleConfig::default();
    let mut rng = SmallRng::seed_from_u64(7);
    let report = step(&mut tree, 1, &config, &mut rng);

    let hit = report.structure.unwrap();
    assert!(hit.damage > 0 && hit.damage <= 75, "damage {}", hit.damage);
    assert!(!hit.destroyed);

    let snapshot = WorldSnapshot::from_tree(&tree);
    let structure = snapshot.tile(LOCATION).unwrap().structure.as_ref().unwrap();
    assert_eq!(structure.health, Some(hit.health_after));
}

#[test]
fn overwhelming_force_cannot_raze_on_first_tick() {
    let mut tree = world(json!({
        "groups": {
            "horde": {"type": "monster", "status": "fighting", "battleId": "b1",
                      "units": [{"id": "h1", "strength": 50_000}, {"id": "h2", "strength": 50_000}]}
        },
        "structure": {"id": "s1", "type": "camp", "health": 5, "battleId": "b1", "battleSide": 2},
        "battles": {"b1": {
            "side1": {"groups": ["horde"]},
            "side2": {"groups": []},
            "targetTypes": ["structure"]
        }}
    }));
    let config = BattleConfig::default();
    let mut rng = SmallRng::seed_from_u64(3);
    let first = step(&mut tree, 1, &config, &mut rng);
    assert_eq!(first.structure.unwrap().health_after, 1);
    // Health 1 of 100 no longer holds the side.
    assert_eq!(first.outcome, Outcome::Victory(BattleSide::Side1));

    // The monster winner razes what is left.
    let snapshot = WorldSnapshot::from_tree(&tree);
    let tile = snapshot.tile(LOCATION).unwrap();
    assert!(tile.structure.is_none());
    assert!(tile.battles.is_empty());
}

#[test]
fn mutual_wipe_is_decided_by_critical_hits() {
    let config = BattleConfig {
        crit_chance: 0.5,
        ..BattleConfig::default()
    };
    let mut decisive = 0;
    for seed in 0..64 {
        let tree = world(json!({
            "groups": {
                "a": {"owner": "pa", "status": "fighting", "battleId": "b1",
                      "units": [{"id": "ua", "player": "pa", "strength": 100}]},
                "d": {"owner": "pd", "status": "fighting", "battleId": "b1",
                      "units": [{"id": "ud", "player": "pd", "strength": 100}]}
            },
            "battles": {"b1": {"side1": {"groups": ["a"]}, "side2": {"groups": ["d"]}}}
        }));
        let snapshot = WorldSnapshot::from_tree(&tree);
        let mut rng = SmallRng::seed_from_u64(seed);
        let resolution = resolve_battle(&snapshot, &target(), 1, 0, &config, &mut rng).unwrap();
        let report = resolution.report;

        assert_eq!(report.units_after.side1 + report.units_after.side2, 0);
        assert_eq!(report.deaths, 2);
        let expected = match (report.crits.side1 > 0, report.crits.side2 > 0) {
            (true, false) => Outcome::Victory(BattleSide::Side1),
            (false, true) => Outcome::Victory(BattleSide::Side2),
            _ => Outcome::Draw,
        };
        assert_eq!(report.outcome, expected, "seed {seed}");
        if report.crits.side1 > 0 && report.crits.side2 == 0 {
            decisive += 1;
        }
    }
    assert!(decisive > 0);
}

#[test]
fn dead_players_are_marked_and_notified() {
    let mut tree = world(json!({
        "groups": {
            "a": {"owner": "pa", "status": "fighting", "battleId": "b1",
                  "units": [{"id": "ua", "player": "pa", "strength": 100}]},
            "d": {"type": "monster", "status": "fighting", "battleId": "b1",
                  "units": [{"id": "wolf", "name": "Dire Wolf", "strength": 100}]}
        },
        "battles": {"b1": {"side1": {"groups": ["a"]}, "side2": {"groups": ["d"]}}}
    }));
    tree["players"] = json!({"pa": {"displayName": "Ash", "alive": true, "inGroup": "a"}});
    let mut rng = SmallRng::seed_from_u64(11);
    let report = step(&mut tree, 1, &BattleConfig::default(), &mut rng);
    assert_eq!(report.deaths, 1);

    let snapshot = WorldSnapshot::from_tree(&tree);
    let player = snapshot.players.get(&PlayerId::from("pa")).unwrap();
    assert!(!player.alive);
    assert!(player.in_group.is_none());
    assert_eq!(player.last_location, Some(LOCATION));
    let message = player.last_message.as_ref().unwrap();
    assert!(message.text.contains("Dire Wolf"), "{}", message.text);

    let events = tree["events"].as_object().unwrap();
    assert!(events.values().any(|e| e["text"].as_str().unwrap().contains("Ash")));
}
