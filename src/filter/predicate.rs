//! Filter predicates
//!
//! A predicate is one `field / operator / value` constraint. Predicates are sent
//! to the backend verbatim as `{ "field": .., "operator": .., "value": .. }`.

use crate::types::FilterValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// Predicate
// ============================================================================

/// One constraint within a `FilterSet`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    /// Field to filter on
    pub field: String,
    /// Comparison operator
    pub operator: PredicateOp,
    /// Value to compare against
    pub value: PredicateValue,
}

impl Predicate {
    /// Create a new predicate
    pub fn new(field: impl Into<String>, operator: PredicateOp, value: PredicateValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create field = value predicate
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, PredicateOp::Eq, PredicateValue::Scalar(value.into()))
    }

    /// Create field != value predicate
    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, PredicateOp::Ne, PredicateValue::Scalar(value.into()))
    }

    /// Create field >= value predicate
    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, PredicateOp::Gte, PredicateValue::Scalar(value.into()))
    }

    /// Create field <= value predicate
    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(field, PredicateOp::Lte, PredicateValue::Scalar(value.into()))
    }

    /// Create substring-match predicate
    pub fn contains(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(
            field,
            PredicateOp::Contains,
            PredicateValue::Scalar(value.into()),
        )
    }

    /// Create field IN (values) predicate
    ///
    /// A single value collapses to `eq`, so `in(f, [a])` and `eq(f, a)` are
    /// the same predicate.
    pub fn one_of(field: impl Into<String>, values: Vec<FilterValue>) -> Self {
        Self::new(field, PredicateOp::In, PredicateValue::List(values)).simplified()
    }

    /// Collapse a one-element `in` list to `eq`
    pub(crate) fn simplified(self) -> Self {
        match (self.operator, self.value) {
            (PredicateOp::In, PredicateValue::List(mut values)) if values.len() == 1 => {
                let value = values.remove(0);
                Self::new(self.field, PredicateOp::Eq, PredicateValue::Scalar(value))
            },
            (operator, value) => Self::new(self.field, operator, value),
        }
    }

    /// Build the natural predicate for a dropdown or chart value
    ///
    /// Lists become `in`, scalars become `eq`.
    pub fn for_value(field: impl Into<String>, value: PredicateValue) -> Self {
        match value {
            PredicateValue::List(values) => Self::one_of(field, values),
            PredicateValue::Scalar(v) => Self::eq(field, v),
        }
    }

    /// Operator class used to enforce one predicate per `(field, class)`
    pub fn class(&self) -> OperatorClass {
        self.operator.class()
    }

    /// Whether the predicate's value list contains `value`
    ///
    /// Scalars compare by equality.
    pub fn holds(&self, value: &FilterValue) -> bool {
        match &self.value {
            PredicateValue::Scalar(v) => v == value,
            PredicateValue::List(values) => values.contains(value),
        }
    }

    /// Canonical text form used for cache keys
    ///
    /// List values are sorted so `in(f, [a, b])` and `in(f, [b, a])` agree.
    pub fn canonical(&self) -> String {
        self.canonical_json().to_string()
    }

    /// `[field, operator, value]` as JSON, with list values sorted and deduplicated
    ///
    /// JSON string escaping keeps the encoding injective whatever the values contain.
    pub(crate) fn canonical_json(&self) -> Value {
        let value = match &self.value {
            PredicateValue::Scalar(v) => v.to_json(),
            PredicateValue::List(values) => {
                let mut parts: Vec<Value> = values.iter().map(FilterValue::to_json).collect();
                parts.sort_by_cached_key(|v| v.to_string());
                parts.dedup();
                Value::Array(parts)
            },
        };
        Value::Array(vec![
            Value::String(self.field.clone()),
            Value::String(self.operator.to_string()),
            value,
        ])
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.operator, self.field, self.value)
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Predicate comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredicateOp {
    /// Equal
    Eq,
    /// In set of values
    In,
    /// Substring match
    Contains,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Not equal
    Ne,
}

impl PredicateOp {
    /// The class this operator belongs to
    pub fn class(self) -> OperatorClass {
        match self {
            PredicateOp::Eq | PredicateOp::In => OperatorClass::Equality,
            PredicateOp::Ne => OperatorClass::Negation,
            PredicateOp::Contains => OperatorClass::Containment,
            PredicateOp::Gte => OperatorClass::LowerBound,
            PredicateOp::Lte => OperatorClass::UpperBound,
        }
    }
}

impl fmt::Display for PredicateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PredicateOp::Eq => "eq",
            PredicateOp::In => "in",
            PredicateOp::Contains => "contains",
            PredicateOp::Gte => "gte",
            PredicateOp::Lte => "lte",
            PredicateOp::Ne => "ne",
        };
        f.write_str(s)
    }
}

/// Groups operators that constrain a field the same way
///
/// `eq` and `in` are both equality: writing one replaces the other.
/// `gte` and `lte` are separate classes so a date range can hold both bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorClass {
    /// `eq`, `in`
    Equality,
    /// `ne`
    Negation,
    /// `contains`
    Containment,
    /// `gte`
    LowerBound,
    /// `lte`
    UpperBound,
}

// ============================================================================
// Values
// ============================================================================

/// Predicate value: a scalar or a list (for `in`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredicateValue {
    /// Single value
    Scalar(FilterValue),
    /// Set of values
    List(Vec<FilterValue>),
}

impl fmt::Display for PredicateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredicateValue::Scalar(v) => write!(f, "{:?}", v.to_string()),
            PredicateValue::List(values) => {
                let parts: Vec<String> = values.iter().map(|v| format!("{:?}", v.to_string())).collect();
                write!(f, "[{}]", parts.join(", "))
            },
        }
    }
}

impl From<FilterValue> for PredicateValue {
    fn from(v: FilterValue) -> Self {
        PredicateValue::Scalar(v)
    }
}

impl From<&str> for PredicateValue {
    fn from(s: &str) -> Self {
        PredicateValue::Scalar(s.into())
    }
}

impl From<String> for PredicateValue {
    fn from(s: String) -> Self {
        PredicateValue::Scalar(s.into())
    }
}

impl From<i64> for PredicateValue {
    fn from(i: i64) -> Self {
        PredicateValue::Scalar(i.into())
    }
}

impl From<Vec<FilterValue>> for PredicateValue {
    fn from(values: Vec<FilterValue>) -> Self {
        PredicateValue::List(values)
    }
}
