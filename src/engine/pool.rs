//! Bounded worker pool over a shared pending-batch queue.
//!
//! Workers claim batches one at a time under a short lock, execute them, and send the
//! outcome to the run's apply consumer. Completion order is whatever the external calls
//! make it; ordering is restored downstream by the reorder buffer.

use crate::engine::executor::BatchExecutor;
use crate::engine::types::{Batch, BatchOutcome};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Batches not yet claimed by any worker.
pub struct PendingBatches {
    queue: Mutex<VecDeque<Batch>>,
}

impl PendingBatches {
    pub fn new(batches: Vec<Batch>) -> Self {
        Self {
            queue: Mutex::new(batches.into()),
        }
    }

    /// Take the lowest-index unclaimed batch. Each batch is handed out exactly once.
    pub fn claim(&self) -> Option<Batch> {
        self.queue.lock().pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Running workers for one run. Dropping the pool aborts any worker still running.
pub struct WorkerPool {
    workers: JoinSet<()>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `min(max_concurrency, batches.len())` workers.
    pub fn spawn(
        batches: Vec<Batch>,
        max_concurrency: usize,
        executor: Arc<BatchExecutor>,
        outcomes: mpsc::Sender<BatchOutcome>,
        cancel: CancellationToken,
    ) -> Self {
        let worker_count = max_concurrency.max(1).min(batches.len());
        let pending = Arc::new(PendingBatches::new(batches));
        let mut workers = JoinSet::new();

        for worker_id in 0..worker_count {
            workers.spawn(worker_loop(
                worker_id,
                Arc::clone(&pending),
                Arc::clone(&executor),
                outcomes.clone(),
                cancel.clone(),
            ));
        }

        Self {
            workers,
            worker_count,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Abort all workers and wait for them to unwind.
    pub async fn shutdown(mut self) {
        self.workers.abort_all();
        while self.workers.join_next().await.is_some() {}
    }
}

async fn worker_loop(
    worker_id: usize,
    pending: Arc<PendingBatches>,
    executor: Arc<BatchExecutor>,
    outcomes: mpsc::Sender<BatchOutcome>,
    cancel: CancellationToken,
) {
    log::debug!("worker {}: started", worker_id);
    let mut executed = 0usize;

    while !cancel.is_cancelled() {
        let Some(batch) = pending.claim() else {
            break;
        };

        log::debug!(
            "worker {}: claimed batch {} ({} rows, {} still pending)",
            worker_id,
            batch.index,
            batch.len(),
            pending.remaining()
        );

        let outcome = executor.execute(&batch).await;
        executed += 1;

        if cancel.is_cancelled() {
            break;
        }
        if outcomes.send(outcome).await.is_err() {
            log::debug!("worker {}: apply consumer gone, stopping", worker_id);
            break;
        }
    }

    log::debug!("worker {}: finished after {} batches", worker_id, executed);
}
