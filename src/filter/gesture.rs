//! Gesture interpretation
//!
//! Turns a click on a chart element into a mutation of the crossfilter
//! fragment. The interpreter is the only writer of that fragment and never
//! looks at page-local filters.
//!
//! | Gesture      | Effect on `field`                                     |
//! |--------------|-------------------------------------------------------|
//! | plain        | replace with `eq(field, value)`                       |
//! | multi-select | toggle `value` in `in(field, [...])`, drop when empty |
//! | clear-all    | remove every crossfilter predicate                    |

use super::predicate::{OperatorClass, Predicate, PredicateValue};
use super::set::{FilterMutation, FilterSet};
use crate::types::FilterValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Kind of user interaction on a visual element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GestureKind {
    /// Plain click
    Plain,
    /// Click with a multi-select modifier held
    MultiSelect,
    /// Clear request (right click / clear button on the chart)
    ClearAll,
}

/// Modifier state captured by the chart binding layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    /// Ctrl held
    pub ctrl: bool,
    /// Meta / Cmd held
    pub meta: bool,
    /// Shift held
    pub shift: bool,
    /// Secondary (right) button
    pub secondary: bool,
}

impl Modifiers {
    /// No modifiers: a plain primary click
    pub fn none() -> Self {
        Self::default()
    }

    /// Ctrl-click
    pub fn multi() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }

    /// Right click
    pub fn secondary() -> Self {
        Self {
            secondary: true,
            ..Self::default()
        }
    }

    /// Map modifier state to a gesture kind
    pub fn gesture_kind(&self) -> GestureKind {
        if self.secondary {
            GestureKind::ClearAll
        } else if self.ctrl || self.meta || self.shift {
            GestureKind::MultiSelect
        } else {
            GestureKind::Plain
        }
    }
}

/// Converts gestures into crossfilter mutations
#[derive(Debug, Clone, Copy, Default)]
pub struct GestureInterpreter;

impl GestureInterpreter {
    /// Create an interpreter
    pub fn new() -> Self {
        Self
    }

    /// Compute the mutation a gesture makes to the crossfilter fragment
    ///
    /// Never fails: malformed input (an empty field name) yields
    /// `FilterMutation::Unchanged`.
    pub fn interpret(
        &self,
        crossfilter: &FilterSet,
        kind: GestureKind,
        field: &str,
        value: &FilterValue,
    ) -> FilterMutation {
        if kind == GestureKind::ClearAll {
            return FilterMutation::ClearAll;
        }

        if field.trim().is_empty() {
            warn!(?kind, "gesture ignored: empty field name");
            return FilterMutation::Unchanged;
        }

        match kind {
            GestureKind::Plain => FilterMutation::Set(Predicate::eq(field, value.clone())),
            GestureKind::MultiSelect => Self::toggle(crossfilter, field, value),
            GestureKind::ClearAll => FilterMutation::ClearAll,
        }
    }

    /// Interpret and apply in one step; returns true if the fragment changed
    pub fn apply(
        &self,
        crossfilter: &mut FilterSet,
        kind: GestureKind,
        field: &str,
        value: &FilterValue,
    ) -> bool {
        let mutation = self.interpret(crossfilter, kind, field, value);
        debug!(?kind, field, %value, ?mutation, "gesture interpreted");
        crossfilter.apply(mutation)
    }

    fn toggle(crossfilter: &FilterSet, field: &str, value: &FilterValue) -> FilterMutation {
        let current = match crossfilter.get(field, OperatorClass::Equality) {
            None => return FilterMutation::Set(Predicate::one_of(field, vec![value.clone()])),
            Some(p) => p,
        };

        let mut values = match &current.value {
            PredicateValue::Scalar(v) => vec![v.clone()],
            PredicateValue::List(values) => values.clone(),
        };

        if let Some(pos) = values.iter().position(|v| v == value) {
            values.remove(pos);
        } else {
            values.push(value.clone());
        }

        if values.is_empty() {
            FilterMutation::RemoveField(field.to_string())
        } else {
            FilterMutation::Set(Predicate::one_of(field, values))
        }
    }
}
