use crate::cleaning::address::combine_address_fields;
use crate::cleaning::config::CleaningConfig;
use crate::cleaning::error::CleaningError;
use crate::cleaning::extract::decode_lenient;
use crate::cleaning::types::{BatchRequest, BatchResponse, RequestRow, RowRequest, RowResponse};
use crate::cleaning::CleaningService;
use crate::models::Row;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

pub const NO_ADDRESS_REASON: &str = "no address found";

/// HTTP implementation of [`CleaningService`].
///
/// Rows whose address columns are all empty or placeholders are answered locally as
/// skipped and never leave the process.
#[derive(Debug, Clone)]
pub struct HttpCleaningClient {
    base_url: String,
    country: String,
    http: Client,
}

impl HttpCleaningClient {
    pub fn new(config: &CleaningConfig) -> Result<Self, CleaningError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .build()?;
        Ok(Self::with_client(config, http))
    }

    pub fn with_client(config: &CleaningConfig, http: Client) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
            http,
        }
    }

    pub async fn healthcheck(&self) -> Result<(), CleaningError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(CleaningError::status(status, body))
        }
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, CleaningError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(url).json(body).send().await?;

        let status = response.status();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read response body".to_string());

        if !status.is_success() {
            return Err(CleaningError::status(status, text));
        }

        decode_lenient(&text)
    }
}

#[async_trait]
impl CleaningService for HttpCleaningClient {
    async fn clean_batch(
        &self,
        header: &[String],
        rows: &[Row],
        start_index: usize,
    ) -> Result<BatchResponse, CleaningError> {
        let addresses: Vec<String> = rows
            .iter()
            .map(|row| combine_address_fields(header, row))
            .collect();

        let outgoing: Vec<RequestRow<'_>> = rows
            .iter()
            .zip(addresses.iter())
            .filter(|(_, address)| !address.is_empty())
            .map(|(row, address)| RequestRow::new(row, address.clone()))
            .collect();

        if outgoing.is_empty() {
            debug!(
                "cleaning: batch at {} has no addresses, skipping call",
                start_index
            );
            return Ok(BatchResponse::ok(
                rows.iter()
                    .map(|_| RowResponse::skipped(NO_ADDRESS_REASON))
                    .collect(),
            ));
        }

        let sent = outgoing.len();
        let request = BatchRequest {
            header,
            rows: outgoing,
            start_index,
            country: &self.country,
        };
        let response: BatchResponse = self.post_json("/clean/batch", &request).await?;

        // Re-expand to one item per input row; a short or failed answer is handed back
        // untouched so the caller sees the shape problem.
        let answered = match (&response.success, &response.results) {
            (true, Some(results)) if results.len() == sent => results.clone(),
            _ => return Ok(response),
        };

        let mut answered = answered.into_iter();
        let results = addresses
            .iter()
            .map(|address| {
                if address.is_empty() {
                    Some(RowResponse::skipped(NO_ADDRESS_REASON))
                } else {
                    answered.next()
                }
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| CleaningError::malformed("batch response shorter than request"))?;

        Ok(BatchResponse::ok(results))
    }

    async fn clean_row(&self, header: &[String], row: &Row) -> Result<RowResponse, CleaningError> {
        let address = combine_address_fields(header, row);
        if address.is_empty() {
            debug!("cleaning: row {} has no address, skipping call", row.index);
            return Ok(RowResponse::skipped(NO_ADDRESS_REASON));
        }

        let request = RowRequest {
            header,
            row: RequestRow::new(row, address),
            index: row.index,
            country: &self.country,
        };
        self.post_json("/clean/row", &request).await
    }
}
