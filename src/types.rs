//! Core data types shared by the filter engine
//!
//! # Key Types
//!
//! - **`FilterValue`**: a scalar constraint value (text, integer or boolean)
//! - **`PageId`**: identifier of a dashboard page registered with the engine
//! - **`Endpoint`**: a backend route the loader can fetch aggregated data from
//!
//! # Example
//!
//! ```rust
//! use ouvidoria_dash::types::{Endpoint, FilterValue, PageId};
//!
//! let page = PageId::new("overview");
//! let value = FilterValue::from("ABERTO");
//! assert_eq!(value.as_str(), Some("ABERTO"));
//! assert_eq!(Endpoint::aggregated().as_str(), "/filter/aggregated");
//! assert_eq!(page.as_str(), "overview");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value carried by a predicate
///
/// Serialized untagged so the backend receives plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Boolean flag (e.g. `prazoVencido = true`)
    Bool(bool),
    /// Integer value (e.g. a year)
    Integer(i64),
    /// Free text value (status names, themes, ISO dates)
    Text(String),
}

impl FilterValue {
    /// Borrow the text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a JSON scalar
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FilterValue::Bool(b) => serde_json::Value::Bool(*b),
            FilterValue::Integer(i) => serde_json::Value::from(*i),
            FilterValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Render the value in the canonical form used for cache keys
    ///
    /// JSON encoding keeps `"1"` and `1` apart and escapes separators.
    pub fn canonical(&self) -> String {
        self.to_json().to_string()
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Integer(i) => write!(f, "{}", i),
            FilterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        FilterValue::Integer(i)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

/// Identifier of a dashboard page
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId(String);

impl PageId {
    /// Create a page id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id is safe to use as a file stem
    ///
    /// Only ASCII alphanumerics, `-` and `_` are accepted.
    pub fn is_file_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Backend route serving filtered data
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    /// Route returning pre-aggregated counts
    pub const AGGREGATED: &'static str = "/filter/aggregated";

    /// Route returning row-level filtered records
    pub const ROWS: &'static str = "/filter";

    /// Create an endpoint from a route path
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The aggregated-counts endpoint
    pub fn aggregated() -> Self {
        Self::new(Self::AGGREGATED)
    }

    /// The row-level records endpoint
    pub fn rows() -> Self {
        Self::new(Self::ROWS)
    }

    /// Borrow the route path
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
