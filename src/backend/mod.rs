//! Aggregation backend contract
//!
//! The engine consumes two routes:
//!
//! - `POST /filter/aggregated` → aggregated counts (normalized to
//!   [`AggregationResult`])
//! - `POST /filter` → row-level records (used to derive month options)
//!
//! Both take `{ "filters": Predicate[] }`. Implementations return raw JSON;
//! shape handling lives in [`normalize`].

pub mod http;
pub mod normalize;
pub mod records;
pub mod result;

use crate::error::BackendError;
use crate::filter::FilterSet;
use crate::types::Endpoint;
use async_trait::async_trait;
use serde_json::Value;

pub use http::HttpBackend;
pub use normalize::{normalize_aggregated, normalize_rows, Record};
pub use records::{available_months, record_month, BR_DATE_FIELD, ISO_DATE_FIELD};
pub use result::{AggregationResult, Bucket, Dimension};

/// Data backend accepting a FilterSet and returning JSON
#[async_trait]
pub trait AggregationBackend: Send + Sync + 'static {
    /// POST the filters to `endpoint` and return the parsed JSON body
    async fn fetch(&self, endpoint: &Endpoint, filters: &FilterSet) -> Result<Value, BackendError>;
}
