//! Per-row persistence of processed results.
//!
//! The engine hands every processed row to an optional [`RowStore`] while applying it. A
//! store failure is recorded against the row as a persistence error; it never changes the
//! row's own classification and never stops the run.

use crate::models::CleanedRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("row store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn save(&self, row_index: usize, record: &CleanedRecord) -> Result<(), StoreError>;
}

/// Appends one JSON object per processed row to a file.
pub struct JsonlRowStore {
    path: PathBuf,
    file: Mutex<File>,
}

#[derive(Serialize)]
struct StoredRow<'a> {
    row_index: usize,
    #[serde(flatten)]
    record: &'a CleanedRecord,
}

impl JsonlRowStore {
    /// Open `path` for appending, creating it when missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        log::info!("row store: appending to {}", path.display());
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RowStore for JsonlRowStore {
    async fn save(&self, row_index: usize, record: &CleanedRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(&StoredRow { row_index, record })?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
