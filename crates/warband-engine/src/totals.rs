//! Tick callback that keeps running totals across the whole run.

use tracing::info;
use warband_core::runner::TickCallback;
use warband_core::tick::TickSummary;

/// Accumulates per-tick summaries and logs battles as they end.
#[derive(Debug, Default)]
pub struct TotalsCallback {
    /// Battles that reached a final outcome.
    pub resolved: u64,
    /// Units lost on both sides of every battle.
    pub casualties: u64,
    /// Players killed.
    pub deaths: u64,
    /// Battles that failed and were retried.
    pub errored: u64,
}

impl TickCallback for TotalsCallback {
    fn on_tick(&mut self, summary: &TickSummary) {
        self.resolved = self.resolved.saturating_add(widen(summary.resolved));
        self.casualties = self.casualties.saturating_add(summary.casualties);
        self.deaths = self.deaths.saturating_add(widen(summary.deaths));
        self.errored = self.errored.saturating_add(widen(summary.errored));

        for report in summary.reports.iter().filter(|r| r.outcome.is_terminal()) {
            info!(
                tick = summary.tick,
                battle_id = %report.battle_id,
                x = report.location.x,
                y = report.location.y,
                outcome = ?report.outcome,
                forced = report.forced,
                "Battle ended"
            );
        }
    }
}

impl TotalsCallback {
    /// Log the accumulated totals.
    pub fn log(&self) {
        info!(
            resolved = self.resolved,
            casualties = self.casualties,
            deaths = self.deaths,
            errored = self.errored,
            "Run totals"
        );
    }
}

fn widen(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}
