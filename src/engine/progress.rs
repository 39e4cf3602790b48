use crate::engine::aggregate::ProgressSnapshot;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;

/// Receives a snapshot after every applied row and once more when the run completes.
///
/// Called from the run's apply consumer; implementations should return quickly.
pub trait ProgressSink: Send + Sync {
    fn on_snapshot(&self, snapshot: ProgressSnapshot);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: ProgressSnapshot) {
        self(snapshot)
    }
}

/// Keeps only the latest snapshot, for pollers.
impl ProgressSink for watch::Sender<ProgressSnapshot> {
    fn on_snapshot(&self, snapshot: ProgressSnapshot) {
        self.send_replace(snapshot);
    }
}

/// Logs one line whenever the whole-percent progress moves.
pub struct LogProgress {
    label: String,
    last_percent: AtomicU8,
}

impl LogProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            last_percent: AtomicU8::new(0),
        }
    }
}

impl ProgressSink for LogProgress {
    fn on_snapshot(&self, snapshot: ProgressSnapshot) {
        let state = &snapshot.state;
        let previous = self
            .last_percent
            .swap(state.progress_percent, Ordering::Relaxed);

        if state.is_complete {
            log::info!(
                "{}: complete - {} processed, {} skipped, {} errors in {:.0}ms",
                self.label,
                state.total_processed,
                state.skipped,
                state.errors.len(),
                state.total_runtime_ms.unwrap_or_default()
            );
        } else if state.progress_percent != previous {
            log::info!(
                "{}: {}% ({}/{} rows, call p95 {:.0}ms)",
                self.label,
                state.progress_percent,
                state.rows_accounted(),
                state.total_expected,
                snapshot.latency.call_latency.p95_ms
            );
        }
    }
}
