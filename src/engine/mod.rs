//! Ordered, bounded-concurrency batch engine.
//!
//! A run turns a row sequence into one result per row by calling the cleaning service in
//! batches, several at a time, while subscribers see results strictly in row order.
//!
//! # Architecture Overview
//!
//! - **`partition`**: Splits the row sequence into contiguous, index-ordered batches.
//!
//! - **`executor`**: Runs one batch. Attempts a single grouped call and falls back to
//!   sequential per-row calls when that call fails in any way. Both paths produce a full
//!   outcome, tagged with the mode used.
//!
//! - **`pool`**: A fixed number of workers claiming batches from a shared queue. Workers only
//!   produce outcomes; they never touch run state.
//!
//! - **`reorder`**: Parks out-of-order outcomes until every lower batch has been released.
//!
//! - **`aggregate`**: Counts, status buckets, errors, latency samples and progress for one
//!   run, plus the immutable snapshots handed to subscribers.
//!
//! - **`progress`**: Subscriber side of snapshots.
//!
//! - **`shared`**: Append-only chunked storage so snapshots share row data instead of
//!   copying it.
//!
//! - **`run`**: Ties the pieces together around a single apply consumer.
//!
//! ## Data Flow
//!
//! 1. **Partition**: rows are cut into batches of `batch_size`
//! 2. **Execute**: up to `max_concurrency` workers run batches, completing in any order
//! 3. **Reorder**: the consumer receives outcomes over a channel and releases them by index
//! 4. **Apply**: each released row is stored (optional), folded into the aggregate, and a
//!    snapshot is published
//! 5. **Complete**: the final snapshot is published with progress at 100
//!
//! ## Failure Model
//!
//! Row errors, skips and store failures are counted and listed, never raised. A grouped
//! call failure is absorbed by the fallback. The run itself fails only on an outcome that
//! does not match its batch, on losing its workers, or on cancellation.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod executor;
pub mod partition;
pub mod pool;
pub mod progress;
pub mod reorder;
pub mod run;
pub mod shared;
pub mod types;

pub use aggregate::{
    AggregateState, ErrorEntry, ErrorKind, LatencySummary, ProcessedRow, ProgressSnapshot,
    StatusCounts, TelemetrySummary,
};
pub use config::EngineConfig;
pub use error::RunError;
pub use executor::BatchExecutor;
pub use partition::partition;
pub use progress::{LogProgress, ProgressSink};
pub use reorder::ReorderBuffer;
pub use run::BatchEngine;
pub use shared::SharedLog;
pub use types::{Batch, BatchOutcome, ExecutionMode, RowResult};
