//! Canonical cache keys
//!
//! A key is the hash of the JSON array `[endpoint, canonical(filters)]` where
//! the canonical form sorts predicates by field and operator. Permutations of the same
//! predicates therefore produce the same key. The canonical text is kept
//! alongside the hash so a lookup can verify an exact match instead of
//! trusting the hash alone.

use crate::filter::FilterSet;
use crate::types::Endpoint;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Cache key derived from `(endpoint, FilterSet)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    hash: u64,
    canonical: Arc<str>,
    unfiltered: bool,
}

impl CacheKey {
    /// Derive the key for an endpoint and filter set
    pub fn new(endpoint: &Endpoint, filters: &FilterSet) -> Self {
        let canonical = serde_json::Value::Array(vec![
            serde_json::Value::String(endpoint.as_str().to_string()),
            filters.canonical_json(),
        ])
        .to_string();
        Self::from_canonical(canonical, filters.is_empty())
    }

    fn from_canonical(canonical: String, unfiltered: bool) -> Self {
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        Self {
            hash: hasher.finish(),
            canonical: canonical.into(),
            unfiltered,
        }
    }

    /// Hash portion of the key
    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    /// Canonical text the hash was computed from
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// True for the empty FilterSet (the full-dataset request)
    pub fn is_unfiltered(&self) -> bool {
        self.unfiltered
    }

    #[cfg(test)]
    pub(crate) fn with_forced_hash(mut self, hash: u64) -> Self {
        self.hash = hash;
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.hash)
    }
}
