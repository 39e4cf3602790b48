//! Client side of the external address cleaning and geocoding service.
//!
//! The batch engine only sees the [`CleaningService`] trait. [`HttpCleaningClient`] is the
//! production implementation; tests substitute scripted in-process services.

pub mod address;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod types;

use crate::models::Row;
use async_trait::async_trait;
use std::sync::Arc;

pub use client::HttpCleaningClient;
pub use config::CleaningConfig;
pub use error::CleaningError;
pub use types::{BatchResponse, RowResponse};

/// The external cleaning call.
///
/// `clean_batch` answers for a contiguous group of rows starting at `start_index`;
/// `clean_row` answers for one row. Neither is retried by the engine.
#[async_trait]
pub trait CleaningService: Send + Sync {
    async fn clean_batch(
        &self,
        header: &[String],
        rows: &[Row],
        start_index: usize,
    ) -> Result<BatchResponse, CleaningError>;

    async fn clean_row(&self, header: &[String], row: &Row) -> Result<RowResponse, CleaningError>;
}

#[async_trait]
impl<T: CleaningService + ?Sized> CleaningService for Arc<T> {
    async fn clean_batch(
        &self,
        header: &[String],
        rows: &[Row],
        start_index: usize,
    ) -> Result<BatchResponse, CleaningError> {
        (**self).clean_batch(header, rows, start_index).await
    }

    async fn clean_row(&self, header: &[String], row: &Row) -> Result<RowResponse, CleaningError> {
        (**self).clean_row(header, row).await
    }
}
