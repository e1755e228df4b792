//! Engine loop runner.
//!
//! [`run_simulation`] repeats [`run_tick`] under three rules:
//!
//! - **Bounded run**: stop after `simulation.max_ticks` ticks (0 = unlimited)
//! - **Fixed cadence**: sleep `world.tick_interval_ms` between ticks
//! - **Clean shutdown**: stop between ticks when the shutdown future resolves
//!
//! [`run_tick`]: crate::tick::run_tick

use std::future::Future;

use tracing::info;
use warband_store::WorldStore;

use crate::config::SimulationConfig;
use crate::tick::{self, TickError, TickSummary};

/// Errors that can occur during the engine run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A tick execution failed.
    #[error("tick error: {source}")]
    Tick {
        /// The underlying tick error.
        #[from]
        source: TickError,
    },
}

/// Why the run loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The configured tick limit was reached.
    MaxTicksReached,
    /// The shutdown future resolved.
    Shutdown,
}

/// Result of the engine run.
#[derive(Debug)]
pub struct RunResult {
    /// Why the run ended.
    pub end_reason: EndReason,
    /// Summary of the last tick run.
    pub final_summary: Option<TickSummary>,
    /// Ticks run in this session.
    pub total_ticks: u64,
}

/// Observer of completed ticks.
pub trait TickCallback: Send {
    /// Receives each tick's summary.
    fn on_tick(&mut self, summary: &TickSummary);
}

/// A no-op tick callback.
pub struct NoOpCallback;

impl TickCallback for NoOpCallback {
    fn on_tick(&mut self, _summary: &TickSummary) {}
}

/// Run the tick loop until the tick limit is reached or `shutdown` resolves.
///
/// # Errors
///
/// Returns [`RunnerError`] if a tick cannot load the world.
pub async fn run_simulation<S: WorldStore>(
    store: &S,
    config: &SimulationConfig,
    callback: &mut dyn TickCallback,
    shutdown: impl Future<Output = ()>,
) -> Result<RunResult, RunnerError> {
    let max_ticks = config.simulation.max_ticks;
    let interval = tokio::time::Duration::from_millis(config.world.tick_interval_ms);
    let mut tick = config.simulation.start_tick;
    let mut last_summary: Option<TickSummary> = None;
    let mut total_ticks: u64 = 0;
    tokio::pin!(shutdown);

    info!(
        start_tick = tick,
        max_ticks,
        tick_interval_ms = config.world.tick_interval_ms,
        seed = config.world.seed,
        "Engine loop starting"
    );

    loop {
        // --- Execute tick ---
        let summary = tick::run_tick(store, tick, config.world.seed, &config.battle).await?;
        total_ticks = total_ticks.saturating_add(1);
        tick = tick.saturating_add(1);

        // --- Notify callback ---
        callback.on_tick(&summary);
        last_summary = Some(summary);

        // --- Check tick limit ---
        if max_ticks > 0 && total_ticks >= max_ticks {
            info!(total_ticks, max_ticks, "Tick limit reached");
            return Ok(RunResult {
                end_reason: EndReason::MaxTicksReached,
                final_summary: last_summary,
                total_ticks,
            });
        }

        // --- Sleep for tick interval, or stop ---
        tokio::select! {
            () = &mut shutdown => {
                info!(total_ticks, "Shutdown requested");
                return Ok(RunResult {
                    end_reason: EndReason::Shutdown,
                    final_summary: last_summary,
                    total_ticks,
                });
            }
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Log the end of a run.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        final_tick = result.final_summary.as_ref().map(|s| s.tick),
        final_battles = result.final_summary.as_ref().map(|s| s.battles),
        "Engine run ended"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use warband_store::MemoryStore;

    use super::*;

    struct Recorder(Vec<u64>);

    impl TickCallback for Recorder {
        fn on_tick(&mut self, summary: &TickSummary) {
            self.0.push(summary.tick);
        }
    }

    fn config(max_ticks: u64) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.world.tick_interval_ms = 0;
        config.simulation.start_tick = 10;
        config.simulation.max_ticks = max_ticks;
        config
    }

    #[tokio::test]
    async fn stops_at_tick_limit() {
        let store = MemoryStore::new(json!({}));
        let mut recorder = Recorder(Vec::new());
        let result = run_simulation(&store, &config(3), &mut recorder, std::future::pending())
            .await
            .unwrap();
        assert_eq!(result.end_reason, EndReason::MaxTicksReached);
        assert_eq!(result.total_ticks, 3);
        assert_eq!(recorder.0, vec![10, 11, 12]);
        assert_eq!(result.final_summary.map(|s| s.tick), Some(12));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let store = MemoryStore::new(json!({}));
        let result = run_simulation(&store, &config(0), &mut NoOpCallback, async {})
            .await
            .unwrap();
        assert_eq!(result.end_reason, EndReason::Shutdown);
        assert_eq!(result.total_ticks, 1);
    }
}
