use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors that occur while calling the cleaning service.
#[derive(Debug, Error)]
pub enum CleaningError {
    #[error("cleaning HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cleaning service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("cleaning response was malformed: {0}")]
    Malformed(String),
    #[error("cleaning service rejected the request: {0}")]
    Rejected(String),
    #[error("cleaning request timed out after {0:?}")]
    Timeout(Duration),
    #[error("cleaning request cancelled")]
    Cancelled,
}

impl CleaningError {
    pub fn status(status: StatusCode, body: String) -> Self {
        CleaningError::Status { status, body }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        CleaningError::Malformed(detail.into())
    }
}

impl From<serde_json::Error> for CleaningError {
    fn from(err: serde_json::Error) -> Self {
        CleaningError::Malformed(err.to_string())
    }
}
