//! Address line composition for outgoing rows.
//!
//! Upload files spread an address across several buyer columns and fill gaps with
//! placeholders such as `XXX` or `0000`. Before a row is sent to the cleaning service the
//! columns are joined into one comma-separated line with placeholders and noise removed.

use crate::models::Row;
use regex::Regex;
use std::sync::OnceLock;

/// Columns that make up the address line, in output order.
pub const ADDRESS_COLUMNS: &[&str] = &[
    "Buyer Address1",
    "Buyer Address1 Number",
    "Buyer Address2",
    "Buyer Address3",
    "Buyer City",
    "Buyer State",
    "Buyer ZIP",
];

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
static NOISE_REGEX: OnceLock<Regex> = OnceLock::new();
static COMMA_RUN_REGEX: OnceLock<Regex> = OnceLock::new();
static WHITESPACE_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| {
        Regex::new(r"(?i)^(x{3,}|0{3,}|null|none|n/a|na|undefined|\$address\.address\d+)$")
            .expect("Invalid placeholder regex")
    })
}

/// E-mail addresses, `CP-` agency codes, agency labels, map-link chatter and tracking
/// numbers that end up pasted into address cells.
fn noise_regex() -> &'static Regex {
    NOISE_REGEX.get_or_init(|| {
        Regex::new(
            r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b|\bCP-\w+\b|\bCorreo Paraguayo\b|\blink de maps\b|\b\d{10,}\b",
        )
        .expect("Invalid address noise regex")
    })
}

fn comma_run_regex() -> &'static Regex {
    COMMA_RUN_REGEX.get_or_init(|| Regex::new(r"\s*,[\s,]*").expect("Invalid comma regex"))
}

fn whitespace_regex() -> &'static Regex {
    WHITESPACE_REGEX.get_or_init(|| Regex::new(r"\s+").expect("Invalid whitespace regex"))
}

/// Clean one address cell. Returns `None` when nothing usable remains.
pub fn clean_part(part: &str) -> Option<String> {
    let trimmed = part.trim();
    if trimmed.is_empty() || placeholder_regex().is_match(trimmed) {
        return None;
    }

    let without_noise = noise_regex().replace_all(trimmed, "");
    let collapsed = comma_run_regex().replace_all(&without_noise, ", ");
    let collapsed = whitespace_regex().replace_all(&collapsed, " ");
    let cleaned = collapsed.trim().trim_matches(',').trim();

    if cleaned.is_empty() || placeholder_regex().is_match(cleaned) {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Join the address columns of `row` into a single line.
///
/// Columns absent from `header` are ignored. An empty string means the row carries no
/// address at all.
pub fn combine_address_fields(header: &[String], row: &Row) -> String {
    ADDRESS_COLUMNS
        .iter()
        .filter_map(|column| row.get(header, column))
        .filter_map(clean_part)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        ADDRESS_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn row(values: &[&str]) -> Row {
        Row {
            index: 0,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn joins_address_columns_in_order() {
        let row = row(&["Mcal. López", "1234", "", "", "Asunción", "Capital", "1209"]);
        assert_eq!(
            combine_address_fields(&header(), &row),
            "Mcal. López, 1234, Asunción, Capital, 1209"
        );
    }

    #[test]
    fn skips_placeholders() {
        let row = row(&["XXX", "0000", "null", "None", "Luque", "N/A", "undefined"]);
        assert_eq!(combine_address_fields(&header(), &row), "Luque");
    }

    #[test]
    fn strips_embedded_noise() {
        assert_eq!(
            clean_part("Calle Palma 123, buyer@example.com, CP-1234").as_deref(),
            Some("Calle Palma 123")
        );
        assert_eq!(
            clean_part("Ruta 2   km 30 ,, 12345678901").as_deref(),
            Some("Ruta 2 km 30")
        );
    }

    #[test]
    fn empty_when_no_address_columns() {
        let header = vec!["Order ID".to_string()];
        assert_eq!(combine_address_fields(&header, &row(&["42"])), "");
    }
}
