//! Aggregation caching
//!
//! - [`key`]: canonical, order-independent cache keys
//! - [`aggregation`]: the two-tier TTL cache written only by the loader

pub mod aggregation;
pub mod key;

pub use aggregation::{AggregationCache, CacheStatsSnapshot, Lookup};
pub use key::CacheKey;
