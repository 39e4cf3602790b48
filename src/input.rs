//! Row sequence loading.
//!
//! Two JSON shapes are accepted:
//!
//! - tabular: `{"header": ["Buyer City", ...], "rows": [["Luque", ...], ...]}`
//! - records: `[{"Buyer City": "Luque", ...}, ...]`, header taken from the first object's
//!   key order; cells missing from later objects become empty strings.

use crate::models::RowSequence;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("input header is empty")]
    EmptyHeader,
    #[error("row {index} has {found} cells, header has {expected}")]
    RaggedRow {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("record {0} is not a JSON object")]
    NotAnObject(usize),
}

#[derive(Deserialize)]
struct TabularInput {
    header: Vec<String>,
    rows: Vec<Vec<Value>>,
}

pub async fn load_rows(path: &Path) -> Result<RowSequence, InputError> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_rows(&raw)
}

pub fn parse_rows(raw: &str) -> Result<RowSequence, InputError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Array(records) => from_records(records),
        other => {
            let tabular: TabularInput = serde_json::from_value(other)?;
            from_tabular(tabular.header, tabular.rows)
        }
    }
}

/// Validate a tabular header/rows pair into a sequence.
pub fn from_tabular(header: Vec<String>, rows: Vec<Vec<Value>>) -> Result<RowSequence, InputError> {
    if header.is_empty() && !rows.is_empty() {
        return Err(InputError::EmptyHeader);
    }

    let mut cells = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != header.len() {
            return Err(InputError::RaggedRow {
                index,
                expected: header.len(),
                found: row.len(),
            });
        }
        cells.push(row.iter().map(cell_to_string).collect());
    }

    Ok(RowSequence::new(header, cells))
}

fn from_records(records: Vec<Value>) -> Result<RowSequence, InputError> {
    let mut objects: Vec<Map<String, Value>> = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        match record {
            Value::Object(map) => objects.push(map),
            _ => return Err(InputError::NotAnObject(index)),
        }
    }

    let header: Vec<String> = match objects.first() {
        Some(first) => first.keys().cloned().collect(),
        None => return Ok(RowSequence::default()),
    };
    if header.is_empty() {
        return Err(InputError::EmptyHeader);
    }

    let cells = objects
        .iter()
        .map(|object| {
            header
                .iter()
                .map(|column| object.get(column).map(cell_to_string).unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(RowSequence::new(header, cells))
}

fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
