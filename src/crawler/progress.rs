//! Progress reporting for long crawl runs.
//!
//! A full backfill covers tens of millions of ids and runs for hours, so the
//! pipeline periodically writes a progress line with completion percentage,
//! rate and an ETA. Lines are emitted at most once per update interval, or
//! sooner when completion has advanced by a full percentage step.

use std::time::{Duration, Instant};
use tracing::info;

use crate::crawler::config::DEFAULT_PROGRESS_INTERVAL;
use crate::crawler::drain::SharedDrain;
use crate::crawler::stats::SharedStats;

const MIN_RUN_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_PERCENTAGE_STEP: f64 = 10.0;

/// Progress of one crawl run
#[derive(Debug, Clone)]
pub struct ProgressState {
    /// Ids whose fetch stage has finished
    pub ids_completed: u64,
    /// Ids in the run's range
    pub total_ids: u64,
    /// Run start
    pub start_time: Instant,
    /// Last emitted line
    pub last_update: Instant,
    /// Minimum interval between lines
    pub update_interval: Duration,
    /// Ids per second since the start
    pub current_rate: f64,
    /// Completion at the last emitted line (0-100)
    pub last_reported_percentage: f64,
    /// Completion delta that forces a line
    pub min_percentage_step: f64,
}

impl ProgressState {
    /// Create a state for a run over `total_ids` ids
    pub fn new(total_ids: u64, update_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            ids_completed: 0,
            total_ids,
            start_time: now,
            last_update: now,
            update_interval,
            current_rate: 0.0,
            last_reported_percentage: 0.0,
            min_percentage_step: DEFAULT_PERCENTAGE_STEP,
        }
    }

    /// Record the current completed count
    pub fn update(&mut self, ids_completed: u64) {
        self.ids_completed = ids_completed.min(self.total_ids);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.current_rate = self.ids_completed as f64 / elapsed;
        }
    }

    /// Whether a line is due, by time or by percentage step
    pub fn should_emit_update(&self) -> bool {
        if self.ids_completed == 0 {
            return false;
        }

        if self.percentage() - self.last_reported_percentage >= self.min_percentage_step {
            return true;
        }

        self.start_time.elapsed() >= MIN_RUN_DURATION
            && self.last_update.elapsed() >= self.update_interval
    }

    /// Reset timers after a line was written
    pub fn mark_emitted(&mut self) {
        self.last_update = Instant::now();
        self.last_reported_percentage = self.percentage();
    }

    /// Completion percentage (0-100)
    pub fn percentage(&self) -> f64 {
        if self.total_ids == 0 {
            return 100.0;
        }
        (self.ids_completed as f64 / self.total_ids as f64) * 100.0
    }

    /// Estimated time to finish the fetch stage
    pub fn estimate_remaining(&self) -> Option<Duration> {
        if self.current_rate <= 0.0 {
            return None;
        }
        let remaining = self.total_ids.saturating_sub(self.ids_completed);
        if remaining == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / self.current_rate))
    }

    /// Human-readable progress line
    pub fn format_progress(&self) -> String {
        let mut parts = vec![
            format!(
                "[PROGRESS] Crawled {}/{} items",
                self.ids_completed, self.total_ids
            ),
            format!("- {:.1}% complete", self.percentage()),
        ];

        if self.current_rate > 0.0 {
            parts.push(format!("at {:.0} items/sec", self.current_rate));
        }

        if let Some(remaining) = self.estimate_remaining() {
            parts.push(format!("- ~{} remaining", format_duration(remaining)));
        }

        parts.join(" ")
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new(0, DEFAULT_PROGRESS_INTERVAL)
    }
}

/// Write progress lines and refresh queue gauges until the task is aborted.
pub(crate) async fn report(
    mut state: ProgressState,
    stats: SharedStats,
    drain: SharedDrain,
) {
    let tick = state
        .update_interval
        .clamp(Duration::from_millis(100), Duration::from_secs(1));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        crate::metrics::record_outstanding(drain.pending_ids(), drain.pending_entities());
        state.update(stats.ids_completed());

        if state.should_emit_update() {
            let summary = stats.snapshot();
            info!(
                completed = state.ids_completed,
                total = state.total_ids,
                persisted = summary.persisted(),
                retries = summary.fetch_retries,
                pending_entities = drain.pending_entities(),
                "{}",
                state.format_progress()
            );
            state.mark_emitted();
        }
    }
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{:.1}h", secs as f64 / 3600.0)
    }
}
