//! Filter state
//!
//! Value types and pure logic for the dashboard's filters:
//!
//! - [`predicate`]: one `field / operator / value` constraint
//! - [`set`]: `FilterSet`, mutations and the source-tagged `FilterState`
//! - [`merge`]: page-local + crossfilter → effective FilterSet
//! - [`gesture`]: chart clicks → crossfilter mutations
//! - [`snapshot`]: best-effort persistence of page-local filters

pub mod gesture;
pub mod merge;
pub mod predicate;
pub mod set;
pub mod snapshot;

pub use gesture::{GestureInterpreter, GestureKind, Modifiers};
pub use merge::{merge_filters, FieldMap};
pub use predicate::{OperatorClass, Predicate, PredicateOp, PredicateValue};
pub use set::{FilterMutation, FilterSet, FilterState, Source};
pub use snapshot::SnapshotStore;
