//! In-process registry of runs started over the HTTP surface.
//!
//! Each run executes on its own task. The registry keeps the latest snapshot through a
//! `watch` channel plus a small lifecycle record, so readers never wait on the run.
//!
//! Finished runs are kept for inspection up to a retention limit (`RETAINED_RUNS`, default
//! 20); starting a run evicts the oldest finished ones beyond it. Running runs are never
//! evicted.

use crate::config::env_usize;
use crate::engine::{AggregateState, BatchEngine, ProgressSnapshot, RunError};
use crate::models::RowSequence;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

#[derive(Debug, Clone)]
struct Lifecycle {
    status: RunStatus,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
}

struct RunHandle {
    started_at: DateTime<Utc>,
    total_rows: usize,
    lifecycle: Arc<Mutex<Lifecycle>>,
    progress: watch::Receiver<ProgressSnapshot>,
    cancel: CancellationToken,
}

/// Compact view of one run.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub total_rows: usize,
    pub rows_accounted: usize,
    pub progress_percent: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// A run's summary together with its latest snapshot.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunDetail {
    #[serde(flatten)]
    pub summary: RunSummary,
    pub snapshot: ProgressSnapshot,
}

pub const DEFAULT_RETAINED_RUNS: usize = 20;

pub struct RunRegistry {
    runs: DashMap<Uuid, RunHandle>,
    shutdown: CancellationToken,
    retained_runs: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_RUNS)
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retention from `RETAINED_RUNS`.
    pub fn from_env() -> Self {
        Self::with_retention(env_usize("RETAINED_RUNS", DEFAULT_RETAINED_RUNS))
    }

    /// Keep at most `retained_runs` finished runs.
    pub fn with_retention(retained_runs: usize) -> Self {
        Self {
            runs: DashMap::new(),
            shutdown: CancellationToken::new(),
            retained_runs,
        }
    }

    /// Start `sequence` on `engine` in the background and return the run id.
    pub fn start(&self, engine: BatchEngine, sequence: RowSequence) -> Uuid {
        self.evict_finished();

        let id = Uuid::new_v4();
        let total_rows = sequence.len();
        let (progress_tx, progress_rx) = watch::channel(AggregateState::new(total_rows).snapshot());
        let cancel = self.shutdown.child_token();
        let lifecycle = Arc::new(Mutex::new(Lifecycle {
            status: RunStatus::Running,
            completed_at: None,
            error_message: None,
        }));

        self.runs.insert(
            id,
            RunHandle {
                started_at: Utc::now(),
                total_rows,
                lifecycle: Arc::clone(&lifecycle),
                progress: progress_rx,
                cancel: cancel.clone(),
            },
        );

        tokio::spawn(async move {
            let label = format!("run {}", id);
            let result = engine.run(&label, sequence, &progress_tx, cancel).await;

            let (status, error_message) = match result {
                Ok(_) => (RunStatus::Completed, None),
                Err(err) => {
                    if let Some(partial) = err.partial_snapshot() {
                        progress_tx.send_replace(partial.clone());
                    }
                    let status = match err {
                        RunError::Cancelled { .. } => RunStatus::Cancelled,
                        _ => RunStatus::Failed,
                    };
                    (status, Some(err.to_string()))
                }
            };

            let mut lifecycle = lifecycle.lock();
            lifecycle.status = status;
            lifecycle.completed_at = Some(Utc::now());
            lifecycle.error_message = error_message;
        });

        log::info!("run {}: registered ({} rows)", id, total_rows);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<RunDetail> {
        self.runs.get(id).map(|handle| {
            let snapshot = handle.progress.borrow().clone();
            RunDetail {
                summary: summarize(*id, &handle, &snapshot),
                snapshot,
            }
        })
    }

    /// Summaries of every known run, oldest first.
    pub fn list(&self) -> Vec<RunSummary> {
        let mut summaries: Vec<RunSummary> = self
            .runs
            .iter()
            .map(|entry| {
                let snapshot = entry.progress.borrow();
                summarize(*entry.key(), entry.value(), &snapshot)
            })
            .collect();
        summaries.sort_by_key(|summary| summary.started_at);
        summaries
    }

    /// Request cancellation. Returns the run's status at the time of the request, or
    /// `None` for an unknown id. Finished runs are left as they are.
    pub fn cancel(&self, id: &Uuid) -> Option<RunStatus> {
        let handle = self.runs.get(id)?;
        let status = handle.lifecycle.lock().status;
        if !status.is_finished() {
            log::info!("run {}: cancellation requested", id);
            handle.cancel.cancel();
        }
        Some(status)
    }

    /// Drop a finished run. Returns the run's status, or `None` for an unknown id; a
    /// running run is left in place and reported as `Running`.
    pub fn remove(&self, id: &Uuid) -> Option<RunStatus> {
        if let Some((_, handle)) = self
            .runs
            .remove_if(id, |_, handle| handle.lifecycle.lock().status.is_finished())
        {
            log::info!("run {}: removed", id);
            return Some(handle.lifecycle.lock().status);
        }
        self.runs
            .get(id)
            .map(|handle| handle.lifecycle.lock().status)
    }

    fn evict_finished(&self) {
        let mut finished: Vec<(Uuid, DateTime<Utc>)> = self
            .runs
            .iter()
            .filter_map(|entry| {
                let lifecycle = entry.lifecycle.lock();
                lifecycle.status.is_finished().then(|| {
                    let finished_at = lifecycle.completed_at.unwrap_or(entry.started_at);
                    (*entry.key(), finished_at)
                })
            })
            .collect();
        if finished.len() <= self.retained_runs {
            return;
        }

        finished.sort_by_key(|(_, finished_at)| Reverse(*finished_at));
        for (id, _) in finished.into_iter().skip(self.retained_runs) {
            self.runs.remove(&id);
            log::debug!("run {}: evicted from registry", id);
        }
    }

    /// Cancel every running run.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Runs that have not finished yet.
    pub fn running(&self) -> usize {
        self.runs
            .iter()
            .filter(|entry| !entry.lifecycle.lock().status.is_finished())
            .count()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

fn summarize(id: Uuid, handle: &RunHandle, snapshot: &ProgressSnapshot) -> RunSummary {
    let lifecycle = handle.lifecycle.lock().clone();
    RunSummary {
        id,
        status: lifecycle.status,
        total_rows: handle.total_rows,
        rows_accounted: snapshot.state.rows_accounted(),
        progress_percent: snapshot.state.progress_percent,
        started_at: handle.started_at,
        completed_at: lifecycle.completed_at,
        error_message: lifecycle.error_message,
    }
}
