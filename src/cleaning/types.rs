//! Wire shapes exchanged with the cleaning service.

use crate::models::{CleanedRecord, Row};
use serde::{Deserialize, Serialize};

/// Body of a grouped cleaning call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest<'a> {
    pub header: &'a [String],
    pub rows: Vec<RequestRow<'a>>,
    pub start_index: usize,
    pub country: &'a str,
}

/// Body of a single-row cleaning call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRequest<'a> {
    pub header: &'a [String],
    pub row: RequestRow<'a>,
    pub index: usize,
    pub country: &'a str,
}

/// A row as sent out: its sequence index, raw cells and the composed address line.
///
/// Rows without an address are left out of grouped calls, so `index` is the only reliable
/// identity of a row inside `rows`; `startIndex` just names the batch.
#[derive(Debug, Serialize)]
pub struct RequestRow<'a> {
    pub index: usize,
    pub values: &'a [String],
    pub address: String,
}

impl<'a> RequestRow<'a> {
    pub fn new(row: &'a Row, address: String) -> Self {
        Self {
            index: row.index,
            values: &row.values,
            address,
        }
    }
}

/// Response to a grouped call.
///
/// `results` is optional on the wire so an absent array is reported as a shape error
/// instead of a decode error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    pub success: bool,
    #[serde(default)]
    pub results: Option<Vec<RowResponse>>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchResponse {
    pub fn ok(results: Vec<RowResponse>) -> Self {
        Self {
            success: true,
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            error: Some(error.into()),
        }
    }
}

/// Per-row outcome reported by the service, either as an item of a grouped response or as
/// the body of a single-row call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub skipped: Option<bool>,
    #[serde(default)]
    pub processed_row: Option<CleanedRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RowResponse {
    pub fn processed(record: CleanedRecord) -> Self {
        Self {
            success: true,
            skipped: None,
            processed_row: Some(record),
            error: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            skipped: Some(true),
            processed_row: None,
            error: Some(reason.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            skipped: None,
            processed_row: None,
            error: Some(error.into()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_row_response_with_camel_case() {
        let response: RowResponse = serde_json::from_str(
            r#"{"success": true, "processedRow": {"city": "Encarnación", "confidence_score": 0.9}}"#,
        )
        .unwrap();
        assert!(response.success);
        assert!(!response.is_skipped());
        let record = response.processed_row.unwrap();
        assert_eq!(record.city.as_deref(), Some("Encarnación"));
    }

    #[test]
    fn batch_response_without_results_decodes() {
        let response: BatchResponse =
            serde_json::from_str(r#"{"success": false, "error": "quota exceeded"}"#).unwrap();
        assert!(!response.success);
        assert!(response.results.is_none());
        assert_eq!(response.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn batch_request_serializes_start_index() {
        let header = vec!["Buyer City".to_string()];
        let row = Row {
            index: 4,
            values: vec!["Luque".to_string()],
        };
        let request = BatchRequest {
            header: &header,
            rows: vec![RequestRow::new(&row, "Luque".to_string())],
            start_index: 4,
            country: "Paraguay",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["startIndex"], 4);
        assert_eq!(json["rows"][0]["index"], 4);
        assert_eq!(json["rows"][0]["address"], "Luque");
    }
}
