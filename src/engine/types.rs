use crate::models::{CleanedRecord, Row};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A contiguous slice of the row sequence, cleaned together in one grouped call attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub start_offset: usize,
    pub rows: Vec<Row>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row index one past the last row of this batch.
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.rows.len()
    }
}

/// Outcome of one row. Exactly one exists per input row at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowResult {
    Processed {
        row_index: usize,
        record: CleanedRecord,
    },
    /// The cleaner declined to classify the row. Not a failure.
    Skipped { row_index: usize, reason: String },
    Error { row_index: usize, message: String },
}

impl RowResult {
    pub fn row_index(&self) -> usize {
        match self {
            RowResult::Processed { row_index, .. }
            | RowResult::Skipped { row_index, .. }
            | RowResult::Error { row_index, .. } => *row_index,
        }
    }

    pub fn is_processed(&self) -> bool {
        matches!(self, RowResult::Processed { .. })
    }
}

/// How a batch was executed. Both modes yield the same outcome shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Grouped,
    Fallback,
}

/// Result of executing one batch. `results` holds one entry per batch row, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub batch_index: usize,
    pub start_offset: usize,
    pub results: Vec<RowResult>,
    pub call_latency_ms: f64,
    pub wall_clock_ms: f64,
    pub mode: ExecutionMode,
}
