//! Row-level record helpers
//!
//! The month dropdown is populated from raw records rather than aggregated
//! counts. Records carry their creation date either as `dataCriacaoIso`
//! (ISO 8601) or as `dataDaCriacao` (`dd/mm/yyyy`).

use super::normalize::Record;
use chrono::{DateTime, NaiveDate};
use serde_json::Value;
use std::collections::BTreeSet;

/// Backend field holding the ISO creation date
pub const ISO_DATE_FIELD: &str = "dataCriacaoIso";

/// Backend field holding the `dd/mm/yyyy` creation date
pub const BR_DATE_FIELD: &str = "dataDaCriacao";

/// Creation month of a record as `YYYY-MM`
pub fn record_month(record: &Record) -> Option<String> {
    if let Some(Value::String(iso)) = record.get(ISO_DATE_FIELD) {
        if let Some(date) = parse_iso_date(iso) {
            return Some(date.format("%Y-%m").to_string());
        }
    }

    if let Some(Value::String(br)) = record.get(BR_DATE_FIELD) {
        let date_part = br.split_whitespace().next().unwrap_or("");
        if let Ok(date) = NaiveDate::parse_from_str(date_part, "%d/%m/%Y") {
            return Some(date.format("%Y-%m").to_string());
        }
    }

    None
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    s.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

/// Distinct creation months across records, newest first
pub fn available_months(records: &[Record]) -> Vec<String> {
    let months: BTreeSet<String> = records.iter().filter_map(record_month).collect();
    months.into_iter().rev().collect()
}
