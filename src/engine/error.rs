use crate::engine::aggregate::ProgressSnapshot;
use thiserror::Error;

/// Conditions that end a run before every row is accounted for.
///
/// Row and batch failures never show up here; they are folded into the aggregate.
#[derive(Debug, Error)]
pub enum RunError {
    /// An outcome disagreed with its batch. Row accounting can no longer be trusted.
    #[error("invariant violated by batch {batch_index}: {detail}")]
    InvariantViolation { batch_index: usize, detail: String },
    #[error("run cancelled after {} rows", .snapshot.state.rows_accounted())]
    Cancelled { snapshot: Box<ProgressSnapshot> },
    /// Workers stopped without delivering every batch.
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl RunError {
    pub fn invariant(batch_index: usize, detail: impl Into<String>) -> Self {
        RunError::InvariantViolation {
            batch_index,
            detail: detail.into(),
        }
    }

    /// Last snapshot published before the run stopped, when one is available.
    pub fn partial_snapshot(&self) -> Option<&ProgressSnapshot> {
        match self {
            RunError::Cancelled { snapshot } => Some(snapshot.as_ref()),
            _ => None,
        }
    }
}
