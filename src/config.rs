//! Environment lookups shared by the configuration structs.
//!
//! Unset or unparsable variables fall back to the supplied default; range checks belong to
//! the struct that owns the value.

use std::env;
use std::time::Duration;

pub(crate) fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_optional_millis(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

pub(crate) fn env_duration_millis(key: &str, default_millis: u64) -> Duration {
    env_optional_millis(key).unwrap_or_else(|| Duration::from_millis(default_millis))
}

pub(crate) fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
