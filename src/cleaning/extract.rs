//! Lenient JSON body decoding.
//!
//! Model-backed cleaners sometimes wrap their JSON in a Markdown fence or surround it with a
//! sentence of prose. The outermost object is pulled out before decoding.

use crate::cleaning::error::CleaningError;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

static FENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn fence_regex() -> &'static Regex {
    FENCE_REGEX.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)```").expect("Invalid code fence regex")
    })
}

/// Return the slice of `text` most likely to hold the JSON object.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = fence_regex()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    let start = inner.find('{')?;
    let end = inner.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&inner[start..=end])
}

/// Decode a response body, tolerating fences and surrounding prose.
pub fn decode_lenient<T: DeserializeOwned>(body: &str) -> Result<T, CleaningError> {
    if let Ok(value) = serde_json::from_str::<T>(body) {
        return Ok(value);
    }

    let candidate = extract_json_object(body)
        .ok_or_else(|| CleaningError::malformed("response did not contain a JSON object"))?;
    Ok(serde_json::from_str::<T>(candidate)?)
}
