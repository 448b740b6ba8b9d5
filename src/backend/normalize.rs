//! Payload normalization
//!
//! One function per endpoint, run once at the loader boundary. Backend
//! versions disagree on label and count field names (`label`, `key`, `theme`,
//! `_id`, ... / `count`, `total`, `value`, ...); everything downstream sees the
//! single canonical shape from [`super::result`].

use super::result::{AggregationResult, Bucket, Dimension};
use crate::error::BackendError;
use serde_json::{Map, Value};
use tracing::warn;

/// Field names tried, in order, for a bucket's label
const LABEL_FIELDS: &[&str] = &["label", "key", "theme", "tema", "name", "nome", "_id"];

/// Field names tried, in order, for a bucket's count
const COUNT_FIELDS: &[&str] = &["count", "total", "value", "quantidade", "qtd"];

/// Field names tried, in order, for the overall total
const TOTAL_FIELDS: &[&str] = &["total", "totalCount", "count"];

/// A row-level record from the `/filter` endpoint
pub type Record = Map<String, Value>;

// ============================================================================
// Aggregated endpoint
// ============================================================================

/// Normalize an aggregated-counts payload
///
/// A top-level value that is not an object is malformed. Inside the object,
/// breakdowns of the wrong type are replaced by empty lists and logged.
pub fn normalize_aggregated(raw: &Value) -> Result<AggregationResult, BackendError> {
    let obj = unwrap_envelope(raw).ok_or_else(|| {
        BackendError::MalformedPayload(format!(
            "expected aggregation object, got {}",
            type_name(raw)
        ))
    })?;

    let mut result = AggregationResult::empty();

    for dim in Dimension::ALL {
        let value = std::iter::once(dim.key())
            .chain(dim.aliases().iter().copied())
            .find_map(|k| obj.get(k));

        match value {
            None | Some(Value::Null) => {},
            Some(Value::Array(items)) => {
                *result.dimension_mut(dim) = items.iter().filter_map(bucket_from).collect();
            },
            Some(other) => {
                warn!(
                    dimension = %dim,
                    found = type_name(other),
                    "breakdown is not a list; using empty list"
                );
            },
        }
    }

    result.total = match TOTAL_FIELDS.iter().find_map(|k| obj.get(*k)).and_then(as_count) {
        Some(total) => total,
        None => result
            .by_status
            .iter()
            .fold(0, |sum: u64, b| sum.saturating_add(b.count)),
    };

    Ok(result)
}

/// Accept `{ ... }` or a versioned envelope `{ "data": { ... } }`
fn unwrap_envelope(raw: &Value) -> Option<&Map<String, Value>> {
    let obj = raw.as_object()?;
    match obj.get("data") {
        Some(Value::Object(inner)) if !has_known_keys(obj) => Some(inner),
        _ => Some(obj),
    }
}

fn has_known_keys(obj: &Map<String, Value>) -> bool {
    TOTAL_FIELDS.iter().any(|k| obj.contains_key(*k))
        || Dimension::ALL.iter().any(|d| obj.contains_key(d.key()))
}

/// Build a bucket from an object item or a `[label, count]` pair
fn bucket_from(item: &Value) -> Option<Bucket> {
    match item {
        Value::Object(obj) => {
            let key = LABEL_FIELDS
                .iter()
                .find_map(|k| obj.get(*k).and_then(as_label))?;
            let count = COUNT_FIELDS
                .iter()
                .find_map(|k| obj.get(*k).and_then(as_count))
                .unwrap_or(0);
            Some(Bucket::new(key, count))
        },
        Value::Array(pair) if pair.len() == 2 => {
            let key = as_label(&pair[0])?;
            let count = as_count(&pair[1]).unwrap_or(0);
            Some(Bucket::new(key, count))
        },
        _ => None,
    }
}

fn as_label(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Counts may arrive as integers, floats or numeric strings
fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Rows endpoint
// ============================================================================

/// Normalize a row-level payload into records
///
/// Accepts a bare array or an object wrapping it under `data` / `rows` /
/// `items`. Non-object rows are dropped.
pub fn normalize_rows(raw: &Value) -> Result<Vec<Record>, BackendError> {
    let rows = match raw {
        Value::Array(rows) => rows,
        Value::Object(obj) => ["data", "rows", "items"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_array))
            .ok_or_else(|| {
                BackendError::MalformedPayload("object payload without a row list".to_string())
            })?,
        other => {
            return Err(BackendError::MalformedPayload(format!(
                "expected row list, got {}",
                type_name(other)
            )))
        },
    };

    let records: Vec<Record> = rows
        .iter()
        .filter_map(|r| r.as_object().cloned())
        .collect();

    if records.len() != rows.len() {
        warn!(
            dropped = rows.len() - records.len(),
            "non-object rows dropped from filter payload"
        );
    }

    Ok(records)
}
