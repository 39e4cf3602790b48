use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ===== Row Models =====

/// One input row. `values` are aligned with the header of the owning [`RowSequence`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Row {
    pub index: usize,
    pub values: Vec<String>,
}

impl Row {
    /// Look up a cell by column name.
    pub fn get<'a>(&'a self, header: &[String], column: &str) -> Option<&'a str> {
        header
            .iter()
            .position(|name| name == column)
            .and_then(|pos| self.values.get(pos))
            .map(|value| value.as_str())
    }
}

/// The ordered input of one run: a header plus rows indexed `0..len`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RowSequence {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSequence {
    /// Build a sequence from raw cell vectors, assigning contiguous indexes.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(index, values)| Row { index, values })
            .collect();
        Self { header, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ===== Cleaned Address Models =====

/// Quality bucket a processed row is tallied under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AddressStatus {
    High,
    Medium,
    Low,
    FailedExternal,
}

impl AddressStatus {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            AddressStatus::High
        } else if confidence >= 0.5 {
            AddressStatus::Medium
        } else {
            AddressStatus::Low
        }
    }
}

/// Geocoder precision reported alongside a cleaned address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationType {
    Rooftop,
    RangeInterpolated,
    GeometricCenter,
    Approximate,
    #[serde(other)]
    Unknown,
}

impl LocationType {
    pub fn confidence(&self) -> f64 {
        match self {
            LocationType::Rooftop => 1.0,
            LocationType::RangeInterpolated => 0.8,
            LocationType::GeometricCenter => 0.6,
            LocationType::Approximate => 0.4,
            LocationType::Unknown => 0.5,
        }
    }
}

/// A row as returned by the cleaning service.
///
/// Only the fields the engine reads are typed; anything else the service sends is kept in
/// `extra` and carried through to the final report untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CleanedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleaned_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_type: Option<LocationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AddressStatus>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CleanedRecord {
    /// Bucket this record is counted under.
    ///
    /// Precedence: explicit status, then confidence score, then geocoder location type.
    /// A record with none of the three never reached the geocoder.
    pub fn classify(&self) -> AddressStatus {
        if let Some(status) = self.status {
            return status;
        }
        if let Some(confidence) = self.confidence_score {
            return AddressStatus::from_confidence(confidence);
        }
        match &self.location_type {
            Some(location_type) => AddressStatus::from_confidence(location_type.confidence()),
            None => AddressStatus::FailedExternal,
        }
    }
}
