//! Batch execution with per-row fallback.
//!
//! One grouped call is attempted per batch. Any failure of that call (transport error,
//! timeout, `success=false`, missing or wrong-length results) switches the batch to
//! sequential single-row calls so that one bad row cannot take its neighbours down with it.
//! Neither call kind is retried.

use crate::cleaning::{BatchResponse, CleaningError, CleaningService, RowResponse};
use crate::engine::types::{Batch, BatchOutcome, ExecutionMode, RowResult};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub struct BatchExecutor {
    service: Arc<dyn CleaningService>,
    header: Arc<[String]>,
    call_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl BatchExecutor {
    pub fn new(
        service: Arc<dyn CleaningService>,
        header: Arc<[String]>,
        call_timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            header,
            call_timeout,
            cancel,
        }
    }

    /// Execute one batch. Always returns one result per batch row, in row order.
    pub async fn execute(&self, batch: &Batch) -> BatchOutcome {
        let dequeued = Instant::now();

        let grouped_started = Instant::now();
        let grouped = self
            .guarded(
                self.service
                    .clean_batch(&self.header, &batch.rows, batch.start_offset),
            )
            .await
            .and_then(|response| validate_grouped(batch, response));
        let grouped_ms = elapsed_ms(grouped_started);

        let (results, call_latency_ms, mode) = match grouped {
            Ok(items) => {
                let results = batch
                    .rows
                    .iter()
                    .zip(items)
                    .map(|(row, item)| to_row_result(row.index, item))
                    .collect();
                (results, grouped_ms, ExecutionMode::Grouped)
            }
            Err(err) => {
                warn!(
                    "batch {}: grouped call for rows {}..{} failed, falling back to per-row calls: {}",
                    batch.index,
                    batch.start_offset,
                    batch.end_offset(),
                    err
                );
                let (results, fallback_ms) = self.execute_per_row(batch).await;
                (results, fallback_ms, ExecutionMode::Fallback)
            }
        };

        BatchOutcome {
            batch_index: batch.index,
            start_offset: batch.start_offset,
            results,
            call_latency_ms,
            wall_clock_ms: elapsed_ms(dequeued),
            mode,
        }
    }

    /// Sequential single-row calls. Latency is the sum of the individual call times.
    async fn execute_per_row(&self, batch: &Batch) -> (Vec<RowResult>, f64) {
        let mut results = Vec::with_capacity(batch.len());
        let mut latency_ms = 0.0;

        for row in &batch.rows {
            if self.cancel.is_cancelled() {
                results.push(RowResult::Error {
                    row_index: row.index,
                    message: CleaningError::Cancelled.to_string(),
                });
                continue;
            }

            let started = Instant::now();
            let response = self.guarded(self.service.clean_row(&self.header, row)).await;
            latency_ms += elapsed_ms(started);

            let result = match response {
                Ok(item) => to_row_result(row.index, item),
                Err(err) => RowResult::Error {
                    row_index: row.index,
                    message: err.to_string(),
                },
            };
            if let RowResult::Error { message, .. } = &result {
                debug!("batch {}: row {} failed: {}", batch.index, row.index, message);
            }
            results.push(result);
        }

        (results, latency_ms)
    }

    /// Apply the per-call timeout and cancellation to one external call.
    async fn guarded<T, F>(&self, call: F) -> Result<T, CleaningError>
    where
        F: Future<Output = Result<T, CleaningError>>,
    {
        let bounded = async {
            match self.call_timeout {
                Some(limit) => match timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(CleaningError::Timeout(limit)),
                },
                None => call.await,
            }
        };

        tokio::select! {
            _ = self.cancel.cancelled() => Err(CleaningError::Cancelled),
            result = bounded => result,
        }
    }
}

fn validate_grouped(batch: &Batch, response: BatchResponse) -> Result<Vec<RowResponse>, CleaningError> {
    if !response.success {
        return Err(CleaningError::Rejected(
            response
                .error
                .unwrap_or_else(|| "grouped call reported failure".to_string()),
        ));
    }

    let results = response
        .results
        .ok_or_else(|| CleaningError::malformed("grouped response has no results"))?;

    if results.len() != batch.len() {
        return Err(CleaningError::malformed(format!(
            "grouped response has {} results for {} rows",
            results.len(),
            batch.len()
        )));
    }

    Ok(results)
}

fn to_row_result(row_index: usize, item: RowResponse) -> RowResult {
    if item.is_skipped() {
        return RowResult::Skipped {
            row_index,
            reason: item
                .error
                .unwrap_or_else(|| "declined by cleaner".to_string()),
        };
    }

    if !item.success {
        return RowResult::Error {
            row_index,
            message: item.error.unwrap_or_else(|| "cleaning failed".to_string()),
        };
    }

    match item.processed_row {
        Some(record) => RowResult::Processed { row_index, record },
        None => RowResult::Error {
            row_index,
            message: "response did not include a processed row".to_string(),
        },
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
