//! Scripted in-process cleaning service shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use geobatch::cleaning::{BatchResponse, CleaningError, CleaningService, RowResponse};
use geobatch::models::{CleanedRecord, Row, RowSequence};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Answers every row with a processed record unless told otherwise.
///
/// Grouped calls are keyed by the start index of their batch.
#[derive(Default)]
pub struct ScriptedService {
    batch_delays: HashMap<usize, Duration>,
    failing_batches: HashSet<usize>,
    failing_rows: HashSet<usize>,
    skipped_rows: HashSet<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    batch_calls: AtomicUsize,
    row_calls: AtomicUsize,
    completed_batches: Mutex<Vec<usize>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_batch(mut self, start_index: usize, millis: u64) -> Self {
        self.batch_delays
            .insert(start_index, Duration::from_millis(millis));
        self
    }

    pub fn fail_batch(mut self, start_index: usize) -> Self {
        self.failing_batches.insert(start_index);
        self
    }

    pub fn fail_row(mut self, row_index: usize) -> Self {
        self.failing_rows.insert(row_index);
        self
    }

    pub fn skip_row(mut self, row_index: usize) -> Self {
        self.skipped_rows.insert(row_index);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn row_calls(&self) -> usize {
        self.row_calls.load(Ordering::SeqCst)
    }

    /// Start indexes of grouped calls, in the order they returned.
    pub fn completed_batches(&self) -> Vec<usize> {
        self.completed_batches.lock().clone()
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    fn answer(&self, row: &Row) -> RowResponse {
        if self.skipped_rows.contains(&row.index) {
            RowResponse::skipped("no address found")
        } else {
            RowResponse::processed(record_for(row.index))
        }
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CleaningService for ScriptedService {
    async fn clean_batch(
        &self,
        _header: &[String],
        rows: &[Row],
        start_index: usize,
    ) -> Result<BatchResponse, CleaningError> {
        let _guard = self.enter();
        self.batch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.batch_delays.get(&start_index) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }
        self.completed_batches.lock().push(start_index);

        if self.failing_batches.contains(&start_index) {
            return Err(CleaningError::malformed(format!(
                "scripted failure for batch at {start_index}"
            )));
        }

        Ok(BatchResponse::ok(
            rows.iter().map(|row| self.answer(row)).collect(),
        ))
    }

    async fn clean_row(&self, _header: &[String], row: &Row) -> Result<RowResponse, CleaningError> {
        let _guard = self.enter();
        self.row_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;

        if self.failing_rows.contains(&row.index) {
            return Err(CleaningError::Rejected(format!(
                "scripted failure for row {}",
                row.index
            )));
        }
        Ok(self.answer(row))
    }
}

pub fn record_for(row_index: usize) -> CleanedRecord {
    CleanedRecord {
        cleaned_address: Some(format!("Avenida Mariscal Lopez {row_index}, Asuncion")),
        city: Some("Asuncion".to_string()),
        country: Some("Paraguay".to_string()),
        confidence_score: Some(0.92),
        ..Default::default()
    }
}

pub fn sequence(n: usize) -> RowSequence {
    RowSequence::new(
        vec!["Buyer Address1".to_string(), "Buyer City".to_string()],
        (0..n)
            .map(|i| vec![format!("Avenida Mariscal Lopez {i}"), "Asuncion".to_string()])
            .collect(),
    )
}
