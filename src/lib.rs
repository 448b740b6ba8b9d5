//! Ouvidoria Dash - filter state and filtered aggregation engine for the
//! ombudsman reporting dashboard
//!
//! This library provides:
//! - Mergeable filter fragments (page-local dropdowns, chart crossfilter)
//! - Gesture interpretation (plain click, multi-select, clear-all)
//! - A canonical-key TTL cache for aggregation results
//! - A debounced, deduplicating, fail-soft data loader
//! - Visibility-gated fan-out to registered pages with per-page update guards

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with TOML support
pub mod config;

/// Filter predicates, sets, merging, gestures and snapshots
pub mod filter;

/// Aggregation result cache keyed by canonical FilterSets
pub mod cache;

/// Backend contract, HTTP client and payload normalization
pub mod backend;

/// Cache-aware, debounced, deduplicating loader
pub mod loader;

/// Page registry and filter change bus
pub mod subscription;

/// Constructor-injected engine facade
pub mod engine;

// Re-export main types
pub use backend::{AggregationBackend, AggregationResult, HttpBackend};
pub use config::Config;
pub use engine::FilterEngine;
pub use error::{Error, Result};
pub use filter::{FilterSet, Modifiers, Predicate};
pub use loader::{FilteredDataLoader, LoadStatus, Loaded};
pub use subscription::{FilterChangeBus, Subscription, SubscriptionRegistry};
pub use types::{Endpoint, FilterValue, PageId};
