//! Aggregation Result Cache
//!
//! Maps `(endpoint, FilterSet)` to previously fetched aggregation results.
//! Supports:
//! - TTL chosen by the caller at `set` time (the cache itself is TTL-agnostic)
//! - Expired entries stay readable as `Lookup::Expired` until replaced,
//!   purged or evicted, so callers can fall back to them
//! - A separate tier for unfiltered requests so the full dataset is never
//!   pushed out by filtered churn
//! - LRU eviction once a tier reaches `max_entries`
//! - Exact canonical-key verification on every hit

use super::key::CacheKey;
use crate::backend::AggregationResult;
use crate::config::CacheConfig;
use crate::filter::FilterSet;
use crate::types::Endpoint;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

// ============================================================================
// Cache Entry
// ============================================================================

/// Cached aggregation result with metadata
struct CacheEntry {
    /// Canonical key text, verified on read
    canonical: Arc<str>,

    /// The cached payload
    payload: Arc<AggregationResult>,

    /// When the entry stops being served
    expires_at: Instant,

    /// Last access time (for LRU)
    last_accessed: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum Lookup {
    /// Fresh entry
    Hit(Arc<AggregationResult>),
    /// Entry exists but its TTL has passed
    Expired(Arc<AggregationResult>),
    /// Nothing usable
    Miss,
}

impl Lookup {
    /// The fresh payload, if any
    pub fn hit(self) -> Option<Arc<AggregationResult>> {
        match self {
            Lookup::Hit(payload) => Some(payload),
            _ => None,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Fresh hits
    pub hits: AtomicU64,

    /// Misses (including expirations and collisions)
    pub misses: AtomicU64,

    /// Entries dropped because their TTL passed
    pub expirations: AtomicU64,

    /// Entries evicted by the LRU bound
    pub evictions: AtomicU64,

    /// Hash matches whose canonical key did not
    pub collisions: AtomicU64,
}

/// Point-in-time cache statistics
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsSnapshot {
    /// Entries in the filtered tier
    pub filtered_entries: usize,
    /// Entries in the unfiltered tier
    pub unfiltered_entries: usize,
    /// Fresh hits
    pub hits: u64,
    /// Misses
    pub misses: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
    /// Expired entries dropped by `purge_expired`
    pub expirations: u64,
    /// LRU evictions
    pub evictions: u64,
    /// Detected hash collisions
    pub collisions: u64,
}

// ============================================================================
// Aggregation Cache
// ============================================================================

/// Two-tier TTL cache for aggregation results
pub struct AggregationCache {
    /// Cache configuration
    config: CacheConfig,

    /// Results for non-empty FilterSets
    filtered: RwLock<HashMap<u64, CacheEntry>>,

    /// Results for the empty FilterSet (full dataset)
    unfiltered: RwLock<HashMap<u64, CacheEntry>>,

    /// Statistics
    stats: CacheStats,
}

impl AggregationCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            filtered: RwLock::new(HashMap::new()),
            unfiltered: RwLock::new(HashMap::new()),
            stats: CacheStats::default(),
        }
    }

    fn tier(&self, key: &CacheKey) -> &RwLock<HashMap<u64, CacheEntry>> {
        if key.is_unfiltered() {
            &self.unfiltered
        } else {
            &self.filtered
        }
    }

    /// Get a fresh result for `(endpoint, filters)`
    pub fn get(&self, endpoint: &Endpoint, filters: &FilterSet) -> Option<Arc<AggregationResult>> {
        self.lookup(&CacheKey::new(endpoint, filters)).hit()
    }

    /// Store a result for `(endpoint, filters)` with the given TTL
    pub fn set(
        &self,
        endpoint: &Endpoint,
        filters: &FilterSet,
        result: Arc<AggregationResult>,
        ttl: Duration,
    ) {
        self.insert(&CacheKey::new(endpoint, filters), result, ttl);
    }

    /// Look up a precomputed key
    pub fn lookup(&self, key: &CacheKey) -> Lookup {
        if !self.config.enabled {
            return Lookup::Miss;
        }

        let now = Instant::now();
        let mut entries = self.tier(key).write();

        let hash = key.hash_value();
        let state = entries
            .get(&hash)
            .map(|e| (e.canonical.as_ref() == key.canonical(), e.is_expired(now)));

        let outcome = match state {
            None => Lookup::Miss,
            Some((false, _)) => {
                self.stats.collisions.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "cache key collision; treating as miss");
                Lookup::Miss
            },
            Some((true, true)) => match entries.get(&hash) {
                Some(entry) => Lookup::Expired(Arc::clone(&entry.payload)),
                None => Lookup::Miss,
            },
            Some((true, false)) => match entries.get_mut(&hash) {
                Some(entry) => {
                    entry.last_accessed = now;
                    Lookup::Hit(Arc::clone(&entry.payload))
                },
                None => Lookup::Miss,
            },
        };

        match &outcome {
            Lookup::Hit(_) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "aggregation cache hit");
            },
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
            },
        }
        outcome
    }

    /// Store under a precomputed key
    pub fn insert(&self, key: &CacheKey, payload: Arc<AggregationResult>, ttl: Duration) {
        if !self.config.enabled {
            return;
        }

        let now = Instant::now();
        let mut entries = self.tier(key).write();

        if !entries.contains_key(&key.hash_value()) {
            while entries.len() >= self.config.max_entries && !entries.is_empty() {
                self.evict_lru(&mut entries);
            }
        }

        entries.insert(
            key.hash_value(),
            CacheEntry {
                canonical: key.canonical().into(),
                payload,
                expires_at: now + ttl,
                last_accessed: now,
            },
        );
    }

    /// Evict the least recently used entry
    fn evict_lru(&self, entries: &mut HashMap<u64, CacheEntry>) {
        let lru_key = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| *k);

        if let Some(key) = lru_key {
            entries.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drop every expired entry (optional memory housekeeping)
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for tier in [&self.filtered, &self.unfiltered] {
            let mut entries = tier.write();
            let before = entries.len();
            entries.retain(|_, e| !e.is_expired(now));
            removed += before - entries.len();
        }
        self.stats
            .expirations
            .fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.filtered.write().clear();
        self.unfiltered.write().clear();
    }

    /// Number of cached entries across both tiers
    pub fn entry_count(&self) -> usize {
        self.filtered.read().len() + self.unfiltered.read().len()
    }

    /// Get hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            filtered_entries: self.filtered.read().len(),
            unfiltered_entries: self.unfiltered.read().len(),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            hit_rate: self.hit_ratio(),
            expirations: self.stats.expirations.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            collisions: self.stats.collisions.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Predicate;

    fn filters(theme: &str) -> FilterSet {
        FilterSet::from_predicates([Predicate::eq("tema", theme)])
    }

    fn result(total: u64) -> Arc<AggregationResult> {
        Arc::new(AggregationResult {
            total,
            ..AggregationResult::empty()
        })
    }

    fn cache() -> AggregationCache {
        AggregationCache::new(CacheConfig::default())
    }

    #[test]
    fn test_put_get() {
        let cache = cache();
        let endpoint = Endpoint::aggregated();
        assert!(cache.get(&endpoint, &filters("A")).is_none());

        cache.set(&endpoint, &filters("A"), result(7), Duration::from_secs(60));
        assert_eq!(cache.get(&endpoint, &filters("A")).unwrap().total, 7);
        assert!(cache.get(&endpoint, &filters("B")).is_none());
    }

    #[test]
    fn test_permuted_filters_hit() {
        let cache = cache();
        let endpoint = Endpoint::aggregated();
        let a = FilterSet::from_predicates([
            Predicate::eq("statusDemanda", "ABERTO"),
            Predicate::eq("tema", "A"),
        ]);
        let b = FilterSet::from_predicates([
            Predicate::eq("tema", "A"),
            Predicate::eq("statusDemanda", "ABERTO"),
        ]);
        cache.set(&endpoint, &a, result(3), Duration::from_secs(60));
        assert!(cache.get(&endpoint, &b).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_stays_readable_until_purged() {
        let cache = cache();
        let key = CacheKey::new(&Endpoint::aggregated(), &filters("A"));
        cache.insert(&key, result(1), Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(600)).await;

        match cache.lookup(&key) {
            Lookup::Expired(stale) => assert_eq!(stale.total, 1),
            other => panic!("expected expired lookup, got {:?}", other),
        }
        assert!(cache.get(&Endpoint::aggregated(), &filters("A")).is_none());
        assert_eq!(cache.entry_count(), 1);

        assert_eq!(cache.purge_expired(), 1);
        assert!(matches!(cache.lookup(&key), Lookup::Miss));
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_collision_is_a_miss() {
        let cache = cache();
        let a = CacheKey::new(&Endpoint::aggregated(), &filters("A")).with_forced_hash(42);
        let b = CacheKey::new(&Endpoint::aggregated(), &filters("B")).with_forced_hash(42);

        cache.insert(&a, result(1), Duration::from_secs(60));
        assert!(matches!(cache.lookup(&b), Lookup::Miss));
        assert_eq!(cache.stats().collisions, 1);
        assert!(matches!(cache.lookup(&a), Lookup::Hit(_)));
    }

    #[test]
    fn test_unfiltered_tier_survives_filtered_churn() {
        let cache = AggregationCache::new(CacheConfig {
            max_entries: 2,
            enabled: true,
        });
        let endpoint = Endpoint::aggregated();
        cache.set(&endpoint, &FilterSet::new(), result(100), Duration::from_secs(600));

        for theme in ["A", "B", "C", "D"] {
            cache.set(&endpoint, &filters(theme), result(1), Duration::from_secs(60));
        }

        assert_eq!(cache.get(&endpoint, &FilterSet::new()).unwrap().total, 100);
        let stats = cache.stats();
        assert_eq!(stats.filtered_entries, 2);
        assert_eq!(stats.unfiltered_entries, 1);
        assert_eq!(stats.evictions, 2);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = AggregationCache::new(CacheConfig {
            max_entries: 1,
            enabled: true,
        });
        let endpoint = Endpoint::aggregated();
        cache.set(&endpoint, &filters("A"), result(1), Duration::from_secs(60));
        cache.set(&endpoint, &filters("A"), result(2), Duration::from_secs(60));
        assert_eq!(cache.get(&endpoint, &filters("A")).unwrap().total, 2);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_cache_disabled() {
        let cache = AggregationCache::new(CacheConfig {
            max_entries: 10,
            enabled: false,
        });
        let endpoint = Endpoint::aggregated();
        cache.set(&endpoint, &filters("A"), result(1), Duration::from_secs(60));
        assert!(cache.get(&endpoint, &filters("A")).is_none());
    }

    #[test]
    fn test_hit_ratio() {
        let cache = cache();
        let endpoint = Endpoint::aggregated();
        cache.set(&endpoint, &filters("A"), result(1), Duration::from_secs(60));
        cache.get(&endpoint, &filters("A"));
        cache.get(&endpoint, &filters("B"));
        assert!((cache.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
