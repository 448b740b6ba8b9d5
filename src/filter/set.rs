//! FilterSet and source-tagged filter state
//!
//! A `FilterSet` is an ordered list of predicates holding at most one predicate
//! per `(field, operator class)`. Writing a predicate for an occupied slot
//! replaces it in place, so repeated dropdown changes never accumulate.

use super::predicate::{OperatorClass, Predicate};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

// ============================================================================
// FilterSet
// ============================================================================

/// Canonical collection of active query constraints
///
/// Serializes as a bare predicate list. Deserializing goes through
/// [`FilterSet::from_predicates`], so duplicate slots in stored data collapse
/// to the last write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FilterSet {
    predicates: Vec<Predicate>,
}

impl FilterSet {
    /// Create an empty filter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from predicates, applying replace-on-write in order
    pub fn from_predicates(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let mut set = Self::new();
        for p in predicates {
            set.upsert(p);
        }
        set
    }

    /// True when no constraint is active ("unfiltered")
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Number of predicates
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Predicates in insertion order
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Iterate predicates in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Predicate> {
        self.predicates.iter()
    }

    /// Insert a predicate, replacing any predicate in the same `(field, class)` slot
    pub fn upsert(&mut self, predicate: Predicate) {
        let predicate = predicate.simplified();
        let class = predicate.class();
        match self
            .predicates
            .iter_mut()
            .find(|p| p.field == predicate.field && p.class() == class)
        {
            Some(slot) => *slot = predicate,
            None => self.predicates.push(predicate),
        }
    }

    /// Get the predicate occupying a `(field, class)` slot
    pub fn get(&self, field: &str, class: OperatorClass) -> Option<&Predicate> {
        self.predicates
            .iter()
            .find(|p| p.field == field && p.class() == class)
    }

    /// Whether any predicate constrains `field`
    pub fn has_field(&self, field: &str) -> bool {
        self.predicates.iter().any(|p| p.field == field)
    }

    /// Remove every predicate on `field`; returns true if something was removed
    pub fn remove_field(&mut self, field: &str) -> bool {
        let before = self.predicates.len();
        self.predicates.retain(|p| p.field != field);
        self.predicates.len() != before
    }

    /// Remove the predicate in a `(field, class)` slot
    pub fn remove(&mut self, field: &str, class: OperatorClass) -> bool {
        let before = self.predicates.len();
        self.predicates
            .retain(|p| !(p.field == field && p.class() == class));
        self.predicates.len() != before
    }

    /// Remove all predicates
    pub fn clear(&mut self) {
        self.predicates.clear();
    }

    /// Copy of this set without any predicate on `field`
    pub fn without_field(&self, field: &str) -> FilterSet {
        FilterSet {
            predicates: self
                .predicates
                .iter()
                .filter(|p| p.field != field)
                .cloned()
                .collect(),
        }
    }

    /// Apply a mutation produced by the gesture interpreter
    ///
    /// Returns true if the set changed.
    pub fn apply(&mut self, mutation: FilterMutation) -> bool {
        match mutation {
            FilterMutation::Set(predicate) => {
                let predicate = predicate.simplified();
                let changed = self.get(&predicate.field, predicate.class()) != Some(&predicate);
                self.upsert(predicate);
                changed
            },
            FilterMutation::RemoveField(field) => self.remove_field(&field),
            FilterMutation::ClearAll => {
                let changed = !self.is_empty();
                self.clear();
                changed
            },
            FilterMutation::Unchanged => false,
        }
    }

    /// Canonical text form: predicates sorted by field, then operator
    pub fn canonical(&self) -> String {
        self.canonical_json().to_string()
    }

    /// Canonical form as a JSON array of `[field, operator, value]` entries
    pub(crate) fn canonical_json(&self) -> Value {
        let mut sorted: Vec<&Predicate> = self.predicates.iter().collect();
        sorted.sort_by(|a, b| {
            a.field
                .cmp(&b.field)
                .then_with(|| a.operator.cmp(&b.operator))
        });
        Value::Array(sorted.iter().map(|p| p.canonical_json()).collect())
    }
}

impl<'de> Deserialize<'de> for FilterSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<Predicate>::deserialize(deserializer).map(Self::from_predicates)
    }
}

impl fmt::Display for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.predicates.iter().map(|p| p.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl<'a> IntoIterator for &'a FilterSet {
    type Item = &'a Predicate;
    type IntoIter = std::slice::Iter<'a, Predicate>;

    fn into_iter(self) -> Self::IntoIter {
        self.predicates.iter()
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// A change to a FilterSet produced by interpreting a gesture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterMutation {
    /// Write a predicate into its `(field, class)` slot
    Set(Predicate),
    /// Drop every predicate on a field
    RemoveField(String),
    /// Drop every predicate
    ClearAll,
    /// No change
    Unchanged,
}

// ============================================================================
// Source-tagged state
// ============================================================================

/// Origin of a filter fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Source {
    /// Dropdown / date controls scoped to the page
    PageLocal,
    /// Clicks on rendered chart elements
    Crossfilter,
}

/// Both filter fragments, kept apart so clearing one never touches the other
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    page_local: FilterSet,
    crossfilter: FilterSet,
}

impl FilterState {
    /// Empty state (application start)
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow a fragment
    pub fn fragment(&self, source: Source) -> &FilterSet {
        match source {
            Source::PageLocal => &self.page_local,
            Source::Crossfilter => &self.crossfilter,
        }
    }

    /// Borrow a fragment mutably
    pub fn fragment_mut(&mut self, source: Source) -> &mut FilterSet {
        match source {
            Source::PageLocal => &mut self.page_local,
            Source::Crossfilter => &mut self.crossfilter,
        }
    }

    /// Clear one fragment; returns true if it held anything
    pub fn clear(&mut self, source: Source) -> bool {
        self.fragment_mut(source).apply(FilterMutation::ClearAll)
    }
}
