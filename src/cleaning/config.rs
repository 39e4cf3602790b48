use crate::config::{env_duration_millis, env_string};
use std::time::Duration;

/// Configuration for the cleaning service client.
#[derive(Debug, Clone)]
pub struct CleaningConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub country: String,
}

impl CleaningConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("CLEANING_SERVICE_URL", "http://cleaner:8080"),
            request_timeout: env_duration_millis("CLEANING_REQUEST_TIMEOUT_MS", 30_000),
            country: env_string("CLEANING_COUNTRY", "Paraguay"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
