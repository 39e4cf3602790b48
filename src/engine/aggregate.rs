//! Run-scoped aggregate state.
//!
//! Owned by the run's apply consumer and mutated one row at a time. Counts only grow,
//! `progress_percent` never goes down, and `is_complete` flips once.

use crate::engine::shared::{SharedLog, SortedSamples};
use crate::engine::types::{BatchOutcome, ExecutionMode, RowResult};
use crate::models::{AddressStatus, CleanedRecord};
use chrono::{DateTime, Utc};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::Serialize;
use std::sync::Arc;

/// Per-bucket tallies of processed rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub failed_external: usize,
}

impl StatusCounts {
    pub fn increment(&mut self, status: AddressStatus) {
        match status {
            AddressStatus::High => self.high += 1,
            AddressStatus::Medium => self.medium += 1,
            AddressStatus::Low => self.low += 1,
            AddressStatus::FailedExternal => self.failed_external += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.high + self.medium + self.low + self.failed_external
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The cleaner declined the row.
    Skipped,
    /// The row's call failed or returned unusable data.
    RowError,
    /// The row was processed but handing it to the row store failed.
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub row_index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

/// A successfully cleaned row. Shared immutably between the live state and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRow {
    pub row_index: usize,
    pub status: AddressStatus,
    pub record: CleanedRecord,
}

/// Count, mean and tail of a latency sample set, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LatencySummary {
    pub count: usize,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub max_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        Self::from_sorted(&sorted, sorted.iter().sum())
    }

    fn from_sorted(sorted: &[f64], sum: f64) -> Self {
        let Some(&max_ms) = sorted.last() else {
            return Self::default();
        };

        let count = sorted.len();
        Self {
            count,
            mean_ms: sum / count as f64,
            p50_ms: nearest_rank(sorted, 50),
            p95_ms: nearest_rank(sorted, 95),
            max_ms,
        }
    }
}

fn nearest_rank(sorted: &[f64], percentile: usize) -> f64 {
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySummary {
    pub call_latency: LatencySummary,
    pub batch_wall_clock: LatencySummary,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateState {
    pub total_expected: usize,
    pub total_processed: usize,
    /// Skipped and errored rows; both advance completion.
    pub skipped: usize,
    pub status_counts: StatusCounts,
    pub results: SharedLog<Arc<ProcessedRow>>,
    pub errors: SharedLog<ErrorEntry>,
    pub progress_percent: u8,
    pub call_latencies: SharedLog<f64>,
    pub batch_wall_clocks: SharedLog<f64>,
    pub batches_applied: usize,
    pub fallback_batches: usize,
    pub last_applied_row: Option<usize>,
    pub is_complete: bool,
    pub started_at: DateTime<Utc>,
    pub total_runtime_ms: Option<f64>,
    #[serde(skip)]
    sorted_call_latencies: SortedSamples,
    #[serde(skip)]
    sorted_wall_clocks: SortedSamples,
    #[serde(skip)]
    telemetry: TelemetrySummary,
}

impl AggregateState {
    pub fn new(total_expected: usize) -> Self {
        Self {
            total_expected,
            total_processed: 0,
            skipped: 0,
            status_counts: StatusCounts::default(),
            results: SharedLog::new(),
            errors: SharedLog::new(),
            progress_percent: 0,
            call_latencies: SharedLog::new(),
            batch_wall_clocks: SharedLog::new(),
            batches_applied: 0,
            fallback_batches: 0,
            last_applied_row: None,
            is_complete: false,
            started_at: Utc::now(),
            total_runtime_ms: None,
            sorted_call_latencies: SortedSamples::default(),
            sorted_wall_clocks: SortedSamples::default(),
            telemetry: TelemetrySummary::default(),
        }
    }

    /// Rows that have reached a final state.
    pub fn rows_accounted(&self) -> usize {
        self.total_processed + self.skipped
    }

    /// Record batch-level telemetry. Called once per batch, before its rows are applied.
    pub fn record_batch(&mut self, outcome: &BatchOutcome) {
        self.call_latencies.push(outcome.call_latency_ms);
        self.batch_wall_clocks.push(outcome.wall_clock_ms);
        self.sorted_call_latencies.insert(outcome.call_latency_ms);
        self.sorted_wall_clocks.insert(outcome.wall_clock_ms);
        self.telemetry = TelemetrySummary {
            call_latency: LatencySummary::from_sorted(
                self.sorted_call_latencies.as_slice(),
                self.sorted_call_latencies.sum(),
            ),
            batch_wall_clock: LatencySummary::from_sorted(
                self.sorted_wall_clocks.as_slice(),
                self.sorted_wall_clocks.sum(),
            ),
        };
        if outcome.mode == ExecutionMode::Fallback {
            self.fallback_batches += 1;
        }
        self.batches_applied += 1;
    }

    /// Fold one row into the state.
    ///
    /// `persistence_error` is set when a processed row could not be stored; the row still
    /// counts as processed.
    pub fn apply_row(&mut self, result: RowResult, persistence_error: Option<String>) {
        let row_index = result.row_index();

        match result {
            RowResult::Processed { row_index, record } => {
                let status = record.classify();
                self.status_counts.increment(status);
                self.total_processed += 1;
                self.results.push(Arc::new(ProcessedRow {
                    row_index,
                    status,
                    record,
                }));
                if let Some(message) = persistence_error {
                    self.errors.push(ErrorEntry {
                        row_index,
                        kind: ErrorKind::Persistence,
                        message,
                    });
                }
            }
            RowResult::Skipped { row_index, reason } => {
                self.skipped += 1;
                self.errors.push(ErrorEntry {
                    row_index,
                    kind: ErrorKind::Skipped,
                    message: reason,
                });
            }
            RowResult::Error { row_index, message } => {
                self.skipped += 1;
                self.errors.push(ErrorEntry {
                    row_index,
                    kind: ErrorKind::RowError,
                    message,
                });
            }
        }

        self.last_applied_row = Some(row_index);
        self.recompute_progress();
    }

    /// Mark the run complete. Idempotent.
    pub fn complete(&mut self, total_runtime_ms: f64) {
        if self.is_complete {
            return;
        }
        self.is_complete = true;
        self.total_runtime_ms = Some(total_runtime_ms);
        self.recompute_progress();
    }

    fn recompute_progress(&mut self) {
        let percent = if self.is_complete {
            100
        } else if self.total_expected == 0 {
            99
        } else {
            (100 * self.rows_accounted() / self.total_expected).min(99)
        };
        self.progress_percent = self.progress_percent.max(percent as u8);
    }

    /// Kept current by [`AggregateState::record_batch`].
    pub fn latency_summary(&self) -> TelemetrySummary {
        self.telemetry.clone()
    }

    /// Independent copy for subscribers. Later mutation of `self` never shows through.
    ///
    /// Row, error and sample lists share storage with the live state; only their open
    /// chunks are copied.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            state: self.clone(),
            latency: self.latency_summary(),
        }
    }
}

/// Point-in-time view of a run handed to progress subscribers.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(flatten)]
    pub state: AggregateState,
    pub latency: TelemetrySummary,
}
