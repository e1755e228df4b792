//! One world tick of battle resolution.
//!
//! Each tick runs through these phases:
//!
//! 1. **Load** -- read the world tree once and build a [`WorldSnapshot`].
//!
//! 2. **Locate** -- find every active battle and every dangling battle
//!    linkage. Dangling linkages are repaired in one commit.
//!
//! 3. **Resolve** -- each battle is resolved from the shared snapshot on a
//!    blocking worker, in parallel, with its own RNG seeded from the world
//!    seed, the tick and the battle id.
//!
//! 4. **Commit** -- each battle's batch is committed on its own. A battle
//!    that fails (error, panic or rejected commit) is logged and skipped;
//!    nothing of it is written and it is retried from scratch next tick.
//!
//! [`WorldSnapshot`]: warband_types::WorldSnapshot

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use warband_battle::{BattleConfig, BattleReport, Outcome, locate, repair_orphans, resolve_battle};
use warband_store::{StoreError, WorldStore};
use warband_types::{BattleId, WorldSnapshot};

/// Errors that abort a whole tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The world could not be loaded.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

/// Summary of a single tick's execution.
#[derive(Debug, Clone, Default)]
pub struct TickSummary {
    /// The tick number that was executed.
    pub tick: u64,
    /// Active battles found.
    pub battles: usize,
    /// Battles whose batch was committed.
    pub processed: usize,
    /// Committed battles that ended this tick.
    pub resolved: usize,
    /// Battles that vanished between locate and resolve.
    pub skipped: usize,
    /// Battles that failed and were left untouched.
    pub errored: usize,
    /// Dangling linkages reset.
    pub orphans_repaired: usize,
    /// Casualties across all committed battles.
    pub casualties: u64,
    /// Player deaths across all committed battles.
    pub deaths: usize,
    /// Reports of every committed battle.
    pub reports: Vec<BattleReport>,
}

impl TickSummary {
    fn record(&mut self, report: BattleReport) {
        self.processed = self.processed.saturating_add(1);
        if report.outcome != Outcome::Continuing {
            self.resolved = self.resolved.saturating_add(1);
        }
        let casualties = u64::from(report.casualties.side1).saturating_add(u64::from(report.casualties.side2));
        self.casualties = self.casualties.saturating_add(casualties);
        self.deaths = self.deaths.saturating_add(report.deaths);
        self.reports.push(report);
    }
}

/// Seed for one battle's RNG: FNV-1a over the world seed, the tick and the
/// battle id.
pub fn battle_seed(world_seed: u64, tick: u64, battle_id: &BattleId) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0100_0000_01b3;

    world_seed
        .to_le_bytes()
        .into_iter()
        .chain(tick.to_le_bytes())
        .chain(battle_id.as_str().bytes())
        .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
}

/// Execute one tick of battle resolution against `store`.
///
/// # Errors
///
/// Returns [`TickError::Store`] only if the world cannot be loaded. Per
/// battle failures are counted in the summary, never propagated.
pub async fn run_tick<S: WorldStore>(
    store: &S,
    tick: u64,
    world_seed: u64,
    config: &BattleConfig,
) -> Result<TickSummary, TickError> {
    // --- Phase 1: Load ---
    let tree = store.load_world().await?;
    let snapshot = Arc::new(WorldSnapshot::from_tree(&tree));
    drop(tree);

    // --- Phase 2: Locate ---
    let scan = locate(&snapshot);
    let mut summary = TickSummary {
        tick,
        battles: scan.battles.len(),
        ..TickSummary::default()
    };
    info!(
        tick,
        battles = scan.battles.len(),
        orphans = scan.orphans.len(),
        "Tick started"
    );

    if !scan.orphans.is_empty() {
        match repair_orphans(&snapshot, &scan) {
            Ok(batch) => match store.commit(batch).await {
                Ok(_) => summary.orphans_repaired = scan.orphans.len(),
                Err(e) => error!(tick, error = %e, "Orphan repair commit failed"),
            },
            Err(e) => error!(tick, error = %e, "Orphan repair failed"),
        }
    }

    // --- Phase 3: Resolve ---
    let now_ms = chrono::Utc::now().timestamp_millis();
    let mut workers = JoinSet::new();
    for target in scan.battles {
        let snapshot = Arc::clone(&snapshot);
        let config = config.clone();
        workers.spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(battle_seed(world_seed, tick, &target.battle_id));
            let result = resolve_battle(&snapshot, &target, tick, now_ms, &config, &mut rng);
            (target, result)
        });
    }

    // --- Phase 4: Commit ---
    while let Some(joined) = workers.join_next().await {
        let (target, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                summary.errored = summary.errored.saturating_add(1);
                error!(tick, panicked = e.is_panic(), error = %e, "Battle worker failed");
                continue;
            }
        };
        let (x, y) = (target.location.x, target.location.y);
        match result {
            Ok(resolution) => {
                let report = resolution.report;
                match store.commit(resolution.batch).await {
                    Ok(stats) => {
                        debug!(
                            tick,
                            battle_id = %target.battle_id,
                            applied = stats.applied,
                            dropped = stats.dropped,
                            "Battle committed"
                        );
                        summary.record(report);
                    }
                    Err(e) => {
                        summary.errored = summary.errored.saturating_add(1);
                        error!(tick, battle_id = %target.battle_id, x, y, error = %e, "Battle commit failed");
                    }
                }
            }
            Err(e) if e.is_skip() => {
                summary.skipped = summary.skipped.saturating_add(1);
                warn!(tick, battle_id = %target.battle_id, x, y, error = %e, "Battle skipped");
            }
            Err(e) => {
                summary.errored = summary.errored.saturating_add(1);
                error!(tick, battle_id = %target.battle_id, x, y, error = %e, "Battle failed");
            }
        }
    }

    info!(
        tick,
        battles = summary.battles,
        processed = summary.processed,
        resolved = summary.resolved,
        skipped = summary.skipped,
        errored = summary.errored,
        casualties = summary.casualties,
        deaths = summary.deaths,
        "Tick complete"
    );
    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::{Value, json};
    use warband_store::{CommitStats, MemoryStore, UpdateBatch};

    use super::*;

    fn world() -> Value {
        json!({
            "chunks": {"0,0": {
                "1,1": {
                    "groups": {
                        "a": {"name": "Knights", "status": "fighting", "battleId": "b1",
                              "units": [{"id": "a1", "strength": 20}, {"id": "a2", "strength": 20}]},
                        "d": {"name": "Wolves", "type": "monster", "status": "fighting", "battleId": "b1",
                              "units": [{"id": "d1", "strength": 20}]}
                    },
                    "battles": {"b1": {"side1": {"groups": ["a"]}, "side2": {"groups": ["d"]}}}
                },
                "2,2": {
                    "groups": {
                        "lost": {"status": "fighting", "battleId": "gone", "units": [{"id": "l1"}]}
                    }
                }
            }},
            "players": {}
        })
    }

    #[test]
    fn battle_seed_is_stable_and_distinct() {
        let id = BattleId::from("b1");
        assert_eq!(battle_seed(42, 7, &id), battle_seed(42, 7, &id));
        assert_ne!(battle_seed(42, 7, &id), battle_seed(42, 8, &id));
        assert_ne!(battle_seed(42, 7, &id), battle_seed(43, 7, &id));
        assert_ne!(battle_seed(42, 7, &id), battle_seed(42, 7, &BattleId::from("b2")));
    }

    #[tokio::test]
    async fn tick_resolves_and_repairs() {
        let store = MemoryStore::new(world());
        let summary = run_tick(&store, 1, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(summary.battles, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.errored, 0);
        assert_eq!(summary.orphans_repaired, 1);
        // 40 power against 20: one casualty each, the lone wolf falls.
        assert_eq!(summary.resolved, 1);

        let after = WorldSnapshot::from_tree(&store.load_world().await.unwrap());
        assert_eq!(after.battle_count(), 0);
        let lost = after
            .tile(warband_types::Location::new(2, 2))
            .unwrap()
            .groups
            .values()
            .next()
            .unwrap();
        assert!(lost.battle_id.is_none());
    }

    #[tokio::test]
    async fn malformed_linkage_is_cleared_when_the_battle_ends() {
        let store = MemoryStore::new(json!({
            "chunks": {"0,0": {"1,1": {
                "groups": {
                    "a": {"name": "Scout", "status": "fighting", "battleId": "b1",
                          "units": [{"id": "a1", "strength": 20}]},
                    "d": {"name": "Pack", "type": "monster", "status": "fighting", "battleId": "b1",
                          "battleSide": 3, "battleRole": 7,
                          "units": [{"id": "d1", "strength": 20}, {"id": "d2", "strength": 20}]}
                },
                "battles": {"b1": {"side1": {"groups": ["a"]}, "side2": {"groups": ["d"]}}}
            }}},
            "players": {}
        }));
        // 20 power against 40: one casualty each, the scout falls.
        let summary = run_tick(&store, 1, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(summary.resolved, 1);

        let tree = store.load_world().await.unwrap();
        let pack = tree
            .pointer("/chunks/0,0/1,1/groups/d")
            .and_then(Value::as_object)
            .unwrap();
        assert_eq!(pack.get("status"), Some(&json!("idle")));
        assert!(!pack.contains_key("battleId"));
        assert!(!pack.contains_key("battleSide"));
        assert!(!pack.contains_key("battleRole"));

        let next = run_tick(&store, 2, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(next.battles, 0);
        assert_eq!(next.orphans_repaired, 0);
    }

    #[tokio::test]
    async fn unreadable_fighting_group_is_reset() {
        let store = MemoryStore::new(json!({
            "chunks": {"0,0": {"1,1": {
                "groups": {
                    "ghost": {"id": ["garbled"], "status": "fighting", "battleId": "b9"}
                }
            }}}
        }));
        let summary = run_tick(&store, 1, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(summary.orphans_repaired, 1);

        let tree = store.load_world().await.unwrap();
        let ghost = tree
            .pointer("/chunks/0,0/1,1/groups/ghost")
            .and_then(Value::as_object)
            .unwrap();
        assert_eq!(ghost.get("status"), Some(&json!("idle")));
        assert!(!ghost.contains_key("battleId"));
    }

    #[tokio::test]
    async fn empty_world_is_a_quiet_tick() {
        let store = MemoryStore::new(json!({}));
        let summary = run_tick(&store, 1, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(summary.battles, 0);
        assert_eq!(summary.processed, 0);
    }

    /// A store whose commits always fail.
    struct RejectingStore(MemoryStore);

    impl WorldStore for RejectingStore {
        async fn load_world(&self) -> Result<Value, StoreError> {
            self.0.load_world().await
        }

        async fn commit(&self, _batch: UpdateBatch) -> Result<CommitStats, StoreError> {
            Err(StoreError::CommitRejected(String::from("read-only")))
        }
    }

    #[tokio::test]
    async fn failed_commit_is_counted_not_propagated() {
        let store = RejectingStore(MemoryStore::new(world()));
        let summary = run_tick(&store, 1, 42, &BattleConfig::default()).await.unwrap();
        assert_eq!(summary.errored, 1);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.orphans_repaired, 0);

        let unchanged = WorldSnapshot::from_tree(&store.load_world().await.unwrap());
        assert_eq!(unchanged.battle_count(), 1);
    }

    #[tokio::test]
    async fn same_seed_same_outcome() {
        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let store = MemoryStore::new(world());
            let summary = run_tick(&store, 3, 9, &BattleConfig::default()).await.unwrap();
            let report = summary.reports.first().cloned().unwrap();
            outcomes.push((report.outcome, report.casualties, report.power));
        }
        assert_eq!(outcomes.first(), outcomes.last());
    }
}
