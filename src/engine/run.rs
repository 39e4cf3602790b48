//! One processing run: partition, execute concurrently, apply in order.

use crate::cleaning::CleaningService;
use crate::engine::aggregate::{AggregateState, ProgressSnapshot};
use crate::engine::config::EngineConfig;
use crate::engine::error::RunError;
use crate::engine::executor::BatchExecutor;
use crate::engine::partition::partition;
use crate::engine::pool::WorkerPool;
use crate::engine::progress::ProgressSink;
use crate::engine::reorder::ReorderBuffer;
use crate::engine::types::{BatchOutcome, RowResult};
use crate::models::RowSequence;
use crate::store::RowStore;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Row span `(start_offset, len)` of each batch, by batch index.
type BatchLayout = Vec<(usize, usize)>;

/// Runs row sequences through the cleaning service.
///
/// The engine holds no per-run state; every call to [`BatchEngine::run`] builds its own
/// queue, reorder buffer and aggregate, so one engine can serve many runs at once.
#[derive(Clone)]
pub struct BatchEngine {
    service: Arc<dyn CleaningService>,
    config: EngineConfig,
    store: Option<Arc<dyn RowStore>>,
}

impl BatchEngine {
    pub fn new(service: Arc<dyn CleaningService>, config: EngineConfig) -> Self {
        Self {
            service,
            config,
            store: None,
        }
    }

    /// Hand every processed row to `store` while it is applied.
    pub fn with_store(mut self, store: Arc<dyn RowStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Same service and store, different run parameters.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Process `sequence` and return the final snapshot.
    ///
    /// `sink` sees one snapshot per applied row, in row order, then a final one with
    /// `is_complete` set. Row and batch failures end up in the snapshot's `errors`; only a
    /// broken outcome, a lost worker or `cancel` end the run early.
    pub async fn run(
        &self,
        label: &str,
        sequence: RowSequence,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> Result<ProgressSnapshot, RunError> {
        let started = Instant::now();
        let mut state = AggregateState::new(sequence.len());

        let batches = partition(&sequence.rows, self.config.batch_size());
        let layout: BatchLayout = batches.iter().map(|b| (b.start_offset, b.len())).collect();

        info!(
            "{}: starting run of {} rows in {} batches (batch size {}, up to {} workers)",
            label,
            state.total_expected,
            layout.len(),
            self.config.batch_size(),
            self.config.max_concurrency()
        );

        if !layout.is_empty() {
            let run_cancel = cancel.child_token();
            let executor = Arc::new(BatchExecutor::new(
                Arc::clone(&self.service),
                Arc::from(sequence.header),
                self.config.call_timeout(),
                run_cancel.clone(),
            ));

            let (outcome_tx, outcome_rx) = mpsc::channel(layout.len());
            let pool = WorkerPool::spawn(
                batches,
                self.config.max_concurrency(),
                executor,
                outcome_tx,
                run_cancel.clone(),
            );
            debug!("{}: spawned {} workers", label, pool.worker_count());

            let consumed = self
                .consume(label, &layout, outcome_rx, &mut state, sink, &run_cancel)
                .await;

            if consumed.is_err() {
                run_cancel.cancel();
            }
            pool.shutdown().await;

            if let Err(err) = consumed {
                match &err {
                    RunError::Cancelled { .. } => warn!("{}: {}", label, err),
                    _ => error!("{}: {}", label, err),
                }
                return Err(err);
            }
        }

        state.complete(started.elapsed().as_secs_f64() * 1000.0);
        let snapshot = state.snapshot();
        sink.on_snapshot(snapshot.clone());

        info!(
            "{}: finished - {} processed, {} skipped, {} fallback batches, {:.0}ms",
            label,
            state.total_processed,
            state.skipped,
            state.fallback_batches,
            state.total_runtime_ms.unwrap_or_default()
        );

        Ok(snapshot)
    }

    /// Single consumer: receive outcomes in completion order, apply them in batch order.
    async fn consume(
        &self,
        label: &str,
        layout: &[(usize, usize)],
        mut outcomes: mpsc::Receiver<BatchOutcome>,
        state: &mut AggregateState,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let mut reorder = ReorderBuffer::new();

        while reorder.next_to_apply() < layout.len() {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RunError::Cancelled {
                        snapshot: Box::new(state.snapshot()),
                    });
                }
                received = outcomes.recv() => match received {
                    Some(outcome) => outcome,
                    None => {
                        return Err(RunError::Aborted(format!(
                            "workers stopped with batch {} of {} still outstanding",
                            reorder.next_to_apply(),
                            layout.len()
                        )));
                    }
                },
            };

            if outcome.batch_index >= layout.len() {
                return Err(RunError::invariant(
                    outcome.batch_index,
                    format!("unknown batch, run has {}", layout.len()),
                ));
            }

            let released = reorder
                .insert(outcome)
                .map_err(|dup| RunError::invariant(dup.batch_index, "outcome delivered twice"))?;

            if released.is_empty() {
                debug!(
                    "{}: batch {} still outstanding, {} parked",
                    label,
                    reorder.next_to_apply(),
                    reorder.parked()
                );
            }

            for outcome in released {
                let (start_offset, len) = layout[outcome.batch_index];
                check_outcome(&outcome, start_offset, len)?;
                self.apply(label, outcome, state, sink).await;
            }
        }

        Ok(())
    }

    async fn apply(
        &self,
        label: &str,
        outcome: BatchOutcome,
        state: &mut AggregateState,
        sink: &dyn ProgressSink,
    ) {
        state.record_batch(&outcome);
        debug!(
            "{}: batch {}: applying {} rows ({:?}, call {:.0}ms)",
            label,
            outcome.batch_index,
            outcome.results.len(),
            outcome.mode,
            outcome.call_latency_ms
        );

        for result in outcome.results {
            let persistence_error = self.persist(label, &result).await;
            state.apply_row(result, persistence_error);
            sink.on_snapshot(state.snapshot());
        }
    }

    async fn persist(&self, label: &str, result: &RowResult) -> Option<String> {
        let (Some(store), RowResult::Processed { row_index, record }) = (&self.store, result)
        else {
            return None;
        };

        match store.save(*row_index, record).await {
            Ok(()) => None,
            Err(err) => {
                warn!("{}: row {}: failed to store result: {}", label, row_index, err);
                Some(err.to_string())
            }
        }
    }
}

/// An outcome must cover exactly its batch's rows, in order.
fn check_outcome(outcome: &BatchOutcome, start_offset: usize, len: usize) -> Result<(), RunError> {
    if outcome.start_offset != start_offset {
        return Err(RunError::invariant(
            outcome.batch_index,
            format!(
                "outcome starts at row {}, batch starts at {}",
                outcome.start_offset, start_offset
            ),
        ));
    }

    if outcome.results.len() != len {
        return Err(RunError::invariant(
            outcome.batch_index,
            format!("{} results for {} rows", outcome.results.len(), len),
        ));
    }

    for (offset, result) in outcome.results.iter().enumerate() {
        let expected = start_offset + offset;
        if result.row_index() != expected {
            return Err(RunError::invariant(
                outcome.batch_index,
                format!("result {} is for row {}, expected {}", offset, result.row_index(), expected),
            ));
        }
    }

    Ok(())
}
