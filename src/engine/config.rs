use crate::config::{env_optional_millis, env_usize};
use std::time::Duration;

pub const DEFAULT_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 25;
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;
pub const MAX_CONCURRENCY: usize = 5;

pub fn clamp_batch_size(batch_size: usize) -> usize {
    batch_size.clamp(1, MAX_BATCH_SIZE)
}

pub fn clamp_concurrency(max_concurrency: usize) -> usize {
    max_concurrency.clamp(1, MAX_CONCURRENCY)
}

/// Run parameters for the batch engine.
///
/// Values are clamped on construction and on every setter, so a config always holds
/// usable numbers regardless of what the environment or a caller supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    batch_size: usize,
    max_concurrency: usize,
    /// Upper bound on a single external call; `None` leaves calls unbounded.
    call_timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(batch_size: usize, max_concurrency: usize) -> Self {
        Self {
            batch_size: clamp_batch_size(batch_size),
            max_concurrency: clamp_concurrency(max_concurrency),
            call_timeout: None,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            env_usize("BATCH_SIZE", DEFAULT_BATCH_SIZE),
            env_usize("MAX_WORKERS", DEFAULT_MAX_CONCURRENCY),
        )
        .with_call_timeout(env_optional_millis("CALL_TIMEOUT_MS"))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = clamp_batch_size(batch_size);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = clamp_concurrency(max_concurrency);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Option<Duration>) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_into_supported_ranges() {
        let config = EngineConfig::new(0, 0);
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_concurrency(), 1);

        let config = EngineConfig::new(500, 64);
        assert_eq!(config.batch_size(), MAX_BATCH_SIZE);
        assert_eq!(config.max_concurrency(), MAX_CONCURRENCY);
    }

    #[test]
    fn setters_clamp_too() {
        let config = EngineConfig::new(3, 2)
            .with_batch_size(26)
            .with_max_concurrency(6)
            .with_call_timeout(Some(Duration::from_millis(250)));
        assert_eq!(config.batch_size(), 25);
        assert_eq!(config.max_concurrency(), 5);
        assert_eq!(config.call_timeout(), Some(Duration::from_millis(250)));
    }
}
