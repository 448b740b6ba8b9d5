//! Filtered Data Loader
//!
//! Fetches aggregated data for a FilterSet. Per endpoint the loader:
//!
//! 1. answers from [`AggregationCache`] when a fresh entry exists
//! 2. collapses bursts of calls inside the debounce window into one
//!    execution with the latest FilterSet
//! 3. shares a single in-flight request among all callers of the same key
//! 4. numbers every network request; a response whose number is no longer the
//!    newest issued for its endpoint is discarded and its callers receive the
//!    newest request's outcome instead
//! 5. never fails: network or payload errors degrade to the stale entry for
//!    the same key, then the endpoint's last known-good result, then the
//!    zeroed [`AggregationResult`]
//!
//! The loader is the only writer of the aggregation cache.

pub mod debounce;

use crate::backend::{
    available_months, normalize_aggregated, normalize_rows, AggregationBackend, AggregationResult,
    Record,
};
use crate::cache::{AggregationCache, CacheKey, Lookup};
use crate::config::LoaderConfig;
use crate::error::BackendError;
use crate::filter::FilterSet;
use crate::types::Endpoint;
use dashmap::DashMap;
use debounce::{BurstOutcome, Debouncer};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

// ============================================================================
// Load outcome
// ============================================================================

/// Where a delivered result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Fetched from the backend for this request
    Fresh,
    /// Served from the aggregation cache
    Cached,
    /// The backend failed; older data is shown instead
    Stale,
    /// The backend failed and nothing was available to fall back on
    Empty,
}

impl LoadStatus {
    /// True when the renderer should show a non-blocking "data may be old" notice
    pub fn is_degraded(self) -> bool {
        matches!(self, LoadStatus::Stale | LoadStatus::Empty)
    }
}

/// Result delivered to a caller of [`FilteredDataLoader::load`]
#[derive(Debug, Clone)]
pub struct Loaded {
    /// Endpoint the result belongs to
    pub endpoint: Endpoint,
    /// FilterSet the result was computed for
    ///
    /// Differs from the requested set when the request was superseded by a
    /// newer one in the same burst.
    pub filters: FilterSet,
    /// The normalized result
    pub result: Arc<AggregationResult>,
    /// Provenance
    pub status: LoadStatus,
    /// Sequence number of the network request that produced `result`
    /// (0 if none did)
    pub sequence: u64,
}

impl Loaded {
    fn empty(endpoint: Endpoint, filters: FilterSet) -> Self {
        Self {
            endpoint,
            filters,
            result: Arc::new(AggregationResult::empty()),
            status: LoadStatus::Empty,
            sequence: 0,
        }
    }
}

/// What the loader is doing for an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderPhase {
    /// Nothing pending
    Idle,
    /// A burst is waiting for its quiet window
    Debouncing,
    /// At least one network request is in flight
    Fetching,
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct LoaderStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    network_calls: AtomicU64,
    deduplicated: AtomicU64,
    debounced: AtomicU64,
    failures: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time loader statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoaderStatsSnapshot {
    /// Calls to `load`
    pub requests: u64,
    /// Calls answered from the cache
    pub cache_hits: u64,
    /// Requests sent to the backend
    pub network_calls: u64,
    /// Callers that joined an in-flight request
    pub deduplicated: u64,
    /// Calls folded into an open debounce burst
    pub debounced: u64,
    /// Failed backend requests
    pub failures: u64,
    /// Responses dropped because a newer request had been issued
    pub discarded: u64,
}

// ============================================================================
// Loader
// ============================================================================

type SharedLoad = Shared<BoxFuture<'static, Loaded>>;

#[derive(Default)]
struct EndpointState {
    /// Last sequence number handed to a network request
    issued: u64,
    /// Sequence number of the newest applied response
    applied: u64,
    /// Filters of the newest applied response
    applied_filters: FilterSet,
    /// Result of the newest applied response
    last_good: Option<Arc<AggregationResult>>,
    /// Requests currently on the wire
    in_flight: usize,
    /// Shared outcome of the newest issued request
    latest: Option<SharedLoad>,
}

struct LoaderInner {
    backend: Arc<dyn AggregationBackend>,
    cache: Arc<AggregationCache>,
    config: LoaderConfig,
    ttl_overrides: DashMap<Endpoint, Duration>,
    // Lock order: `in_flight` before `endpoints`, never the reverse.
    in_flight: Mutex<HashMap<CacheKey, SharedLoad>>,
    endpoints: Mutex<HashMap<Endpoint, EndpointState>>,
    stats: LoaderStats,
}

/// Cache-aware, deduplicating, debounced loader
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FilteredDataLoader {
    inner: Arc<LoaderInner>,
    debouncer: Arc<Debouncer<Endpoint, FilterSet, Loaded>>,
}

impl FilteredDataLoader {
    /// Create a loader over `backend` writing into `cache`
    pub fn new(
        backend: Arc<dyn AggregationBackend>,
        cache: Arc<AggregationCache>,
        config: LoaderConfig,
    ) -> Self {
        let debouncer = Arc::new(Debouncer::new(config.debounce()));
        Self {
            inner: Arc::new(LoaderInner {
                backend,
                cache,
                config,
                ttl_overrides: DashMap::new(),
                in_flight: Mutex::new(HashMap::new()),
                endpoints: Mutex::new(HashMap::new()),
                stats: LoaderStats::default(),
            }),
            debouncer,
        }
    }

    /// Use `ttl` for results of `endpoint` instead of the configured defaults
    pub fn with_endpoint_ttl(self, endpoint: Endpoint, ttl: Duration) -> Self {
        self.set_endpoint_ttl(endpoint, ttl);
        self
    }

    /// Change the TTL policy for `endpoint`; applies to later cache writes
    pub fn set_endpoint_ttl(&self, endpoint: Endpoint, ttl: Duration) {
        debug!(%endpoint, ttl_ms = ttl.as_millis() as u64, "endpoint TTL override");
        self.inner.ttl_overrides.insert(endpoint, ttl);
    }

    /// The cache this loader writes
    pub fn cache(&self) -> &Arc<AggregationCache> {
        &self.inner.cache
    }

    /// Load aggregated data for `filters` from `endpoint`
    ///
    /// Never fails. See the module docs for the fallback order.
    pub async fn load(&self, endpoint: &Endpoint, filters: &FilterSet) -> Loaded {
        let inner = &self.inner;
        inner.stats.requests.fetch_add(1, Ordering::Relaxed);

        if let Some(loaded) = inner.cached(endpoint, filters) {
            // An open burst must not send filters older than this call's
            self.retarget(endpoint, filters);
            return loaded;
        }

        if self.debouncer.window().is_zero() {
            return Arc::clone(inner).execute(endpoint.clone(), filters.clone()).await;
        }

        let outcome = self.debounced(endpoint, filters);
        match outcome.await {
            Some(loaded) => loaded,
            None => {
                warn!(%endpoint, "debounced load aborted; delivering empty result");
                Loaded::empty(endpoint.clone(), filters.clone())
            },
        }
    }

    /// Point an open debounce burst for `endpoint` at newer filters
    ///
    /// Used when a filter change arrives for a consumer that is still waiting
    /// on a burst: the pending request is redirected instead of queuing a
    /// second one. Returns false if no burst is open.
    pub fn retarget(&self, endpoint: &Endpoint, filters: &FilterSet) -> bool {
        let retargeted = self.debouncer.retarget(endpoint, filters.clone());
        if retargeted {
            self.inner.stats.debounced.fetch_add(1, Ordering::Relaxed);
            debug!(%endpoint, filters = %filters, "debounce burst retargeted");
        }
        retargeted
    }

    fn debounced(&self, endpoint: &Endpoint, filters: &FilterSet) -> BurstOutcome<Loaded> {
        let joining = self.debouncer.is_pending(endpoint);
        if joining {
            self.inner.stats.debounced.fetch_add(1, Ordering::Relaxed);
            debug!(%endpoint, filters = %filters, "joining debounce burst");
        }

        let inner = Arc::clone(&self.inner);
        let target = endpoint.clone();
        self.debouncer.submit(endpoint.clone(), filters.clone(), move |latest| {
            inner.execute(target, latest)
        })
    }

    /// Fetch row-level records matching `filters`
    ///
    /// Rows are not cached. Failures degrade to an empty list.
    pub async fn load_records(&self, filters: &FilterSet) -> Vec<Record> {
        let endpoint = Endpoint::rows();
        let fetched = AssertUnwindSafe(self.inner.backend.fetch(&endpoint, filters))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(BackendError::Transport("backend panicked".to_string())))
            .and_then(|raw| normalize_rows(&raw));

        match fetched {
            Ok(rows) => rows,
            Err(e) => {
                self.inner.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%endpoint, error = %e, "row fetch failed; no records");
                Vec::new()
            },
        }
    }

    /// Distinct `YYYY-MM` months present in the rows matching `filters`,
    /// newest first
    pub async fn available_months(&self, filters: &FilterSet) -> Vec<String> {
        available_months(&self.load_records(filters).await)
    }

    /// Newest applied result for `endpoint`
    pub fn last_known_good(&self, endpoint: &Endpoint) -> Option<Arc<AggregationResult>> {
        self.inner
            .endpoints
            .lock()
            .get(endpoint)
            .and_then(|s| s.last_good.clone())
    }

    /// Current phase for `endpoint`
    pub fn phase(&self, endpoint: &Endpoint) -> LoaderPhase {
        let fetching = self
            .inner
            .endpoints
            .lock()
            .get(endpoint)
            .map_or(false, |s| s.in_flight > 0);
        if fetching {
            LoaderPhase::Fetching
        } else if self.debouncer.is_pending(endpoint) {
            LoaderPhase::Debouncing
        } else {
            LoaderPhase::Idle
        }
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> LoaderStatsSnapshot {
        let s = &self.inner.stats;
        LoaderStatsSnapshot {
            requests: s.requests.load(Ordering::Relaxed),
            cache_hits: s.cache_hits.load(Ordering::Relaxed),
            network_calls: s.network_calls.load(Ordering::Relaxed),
            deduplicated: s.deduplicated.load(Ordering::Relaxed),
            debounced: s.debounced.load(Ordering::Relaxed),
            failures: s.failures.load(Ordering::Relaxed),
            discarded: s.discarded.load(Ordering::Relaxed),
        }
    }
}

impl LoaderInner {
    fn ttl_for(&self, endpoint: &Endpoint, key: &CacheKey) -> Duration {
        if let Some(ttl) = self.ttl_overrides.get(endpoint) {
            return *ttl.value();
        }
        if key.is_unfiltered() {
            self.config.full_dataset_ttl()
        } else {
            self.config.filtered_ttl()
        }
    }

    fn applied_sequence(&self, endpoint: &Endpoint) -> u64 {
        self.endpoints.lock().get(endpoint).map_or(0, |s| s.applied)
    }

    fn cached(&self, endpoint: &Endpoint, filters: &FilterSet) -> Option<Loaded> {
        let key = CacheKey::new(endpoint, filters);
        let result = self.cache.lookup(&key).hit()?;
        self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
        debug!(%endpoint, %key, "aggregation cache hit");
        Some(Loaded {
            endpoint: endpoint.clone(),
            filters: filters.clone(),
            result,
            status: LoadStatus::Cached,
            sequence: self.applied_sequence(endpoint),
        })
    }

    /// Run one (possibly shared) request for the winning filters
    async fn execute(self: Arc<Self>, endpoint: Endpoint, filters: FilterSet) -> Loaded {
        let key = CacheKey::new(&endpoint, &filters);

        // The cache may have been filled while the burst was waiting.
        let stale = match self.cache.lookup(&key) {
            Lookup::Hit(result) => {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Loaded {
                    sequence: self.applied_sequence(&endpoint),
                    endpoint,
                    filters,
                    result,
                    status: LoadStatus::Cached,
                };
            },
            Lookup::Expired(stale) => Some(stale),
            Lookup::Miss => None,
        };

        let request = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    self.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
                    debug!(%endpoint, %key, "joining in-flight request");
                    existing.clone()
                },
                None => {
                    let mut endpoints = self.endpoints.lock();
                    let state = endpoints.entry(endpoint.clone()).or_default();
                    state.issued += 1;
                    state.in_flight += 1;
                    let request = Arc::clone(&self)
                        .fetch(endpoint, filters, key.clone(), state.issued, stale)
                        .boxed()
                        .shared();
                    state.latest = Some(request.clone());
                    drop(endpoints);
                    in_flight.insert(key, request.clone());
                    request
                },
            }
        };

        request.await
    }

    async fn fetch(
        self: Arc<Self>,
        endpoint: Endpoint,
        filters: FilterSet,
        key: CacheKey,
        sequence: u64,
        stale: Option<Arc<AggregationResult>>,
    ) -> Loaded {
        self.stats.network_calls.fetch_add(1, Ordering::Relaxed);
        debug!(%endpoint, %key, sequence, filters = %filters, "fetching aggregation");

        let outcome = AssertUnwindSafe(self.backend.fetch(&endpoint, &filters))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(BackendError::Transport("backend panicked".to_string())))
            .and_then(|raw| normalize_aggregated(&raw));

        self.in_flight.lock().remove(&key);

        if let Some(newest) = self.settle(&endpoint, sequence) {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                %endpoint,
                sequence,
                succeeded = outcome.is_ok(),
                "discarding superseded response"
            );
            return newest.await;
        }

        match outcome {
            Ok(result) => self.apply(endpoint, filters, &key, sequence, Arc::new(result)),
            Err(e) => self.degrade(endpoint, filters, sequence, stale, e),
        }
    }

    /// Mark a request as off the wire
    ///
    /// Returns the newest request's shared outcome when `sequence` is no
    /// longer the newest issued for `endpoint`.
    fn settle(&self, endpoint: &Endpoint, sequence: u64) -> Option<SharedLoad> {
        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.clone()).or_default();
        state.in_flight = state.in_flight.saturating_sub(1);
        if sequence < state.issued {
            state.latest.clone()
        } else {
            None
        }
    }

    /// Record the newest request's successful response
    fn apply(
        &self,
        endpoint: Endpoint,
        filters: FilterSet,
        key: &CacheKey,
        sequence: u64,
        result: Arc<AggregationResult>,
    ) -> Loaded {
        let mut endpoints = self.endpoints.lock();
        let state = endpoints.entry(endpoint.clone()).or_default();
        state.applied = sequence;
        state.applied_filters = filters.clone();
        state.last_good = Some(Arc::clone(&result));
        drop(endpoints);

        self.cache
            .insert(key, Arc::clone(&result), self.ttl_for(&endpoint, key));

        Loaded {
            endpoint,
            filters,
            result,
            status: LoadStatus::Fresh,
            sequence,
        }
    }

    /// Fall back after a failed request; nothing is cached
    fn degrade(
        &self,
        endpoint: Endpoint,
        filters: FilterSet,
        sequence: u64,
        stale: Option<Arc<AggregationResult>>,
        error: BackendError,
    ) -> Loaded {
        self.stats.failures.fetch_add(1, Ordering::Relaxed);

        let last_good = self.endpoints.lock().get(&endpoint).and_then(|state| {
            state
                .last_good
                .clone()
                .map(|r| (r, state.applied_filters.clone(), state.applied))
        });

        if error.is_transient() {
            warn!(%endpoint, sequence, error = %error, "backend request failed");
        } else {
            warn!(%endpoint, sequence, error = %error, "malformed backend payload");
        }

        if let Some(result) = stale {
            return Loaded {
                endpoint,
                filters,
                result,
                status: LoadStatus::Stale,
                sequence,
            };
        }

        match last_good {
            Some((result, applied_filters, applied)) => Loaded {
                endpoint,
                filters: applied_filters,
                result,
                status: LoadStatus::Stale,
                sequence: applied,
            },
            None => Loaded::empty(endpoint, filters),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::filter::Predicate;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    /// Backend that answers with `total = number of predicates * 10 + call`
    struct CountingBackend {
        calls: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
        delay: Duration,
    }

    impl CountingBackend {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
                delay,
            })
        }
    }

    #[async_trait]
    impl AggregationBackend for CountingBackend {
        async fn fetch(&self, _endpoint: &Endpoint, filters: &FilterSet) -> Result<Value, BackendError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            tokio::time::sleep(self.delay).await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(BackendError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(json!({ "total": filters.len() as u64 * 10 + call }))
        }
    }

    fn loader(backend: Arc<CountingBackend>, debounce_ms: u64) -> FilteredDataLoader {
        let config = LoaderConfig {
            debounce_ms,
            ..LoaderConfig::default()
        };
        FilteredDataLoader::new(
            backend,
            Arc::new(AggregationCache::new(CacheConfig::default())),
            config,
        )
    }

    fn tema(value: &str) -> FilterSet {
        FilterSet::from_predicates([Predicate::eq("tema", value)])
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_load_is_served_from_cache() {
        let backend = CountingBackend::new(Duration::from_millis(10));
        let loader = loader(backend.clone(), 0);
        let ep = Endpoint::aggregated();

        let first = loader.load(&ep, &tema("A")).await;
        let second = loader.load(&ep, &tema("A")).await;

        assert_eq!(first.status, LoadStatus::Fresh);
        assert_eq!(second.status, LoadStatus::Cached);
        assert!(Arc::ptr_eq(&first.result, &second.result));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_loads_share_one_request() {
        let backend = CountingBackend::new(Duration::from_millis(50));
        let loader = loader(backend.clone(), 0);
        let ep = Endpoint::aggregated();
        let filters = tema("A");

        let (a, b) = tokio::join!(loader.load(&ep, &filters), loader.load(&ep, &filters));

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a.result, &b.result));
        assert_eq!(loader.stats().deduplicated, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_sends_only_latest_filters() {
        let backend = CountingBackend::new(Duration::from_millis(10));
        let loader = loader(backend.clone(), 150);
        let ep = Endpoint::aggregated();

        let a_filters = tema("A");
        let first = loader.load(&ep, &a_filters);
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            loader.load(&ep, &tema("B")).await
        };
        let (a, b) = tokio::join!(first, second);

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.filters, tema("B"));
        assert_eq!(b.filters, tema("B"));
        assert!(Arc::ptr_eq(&a.result, &b.result));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_hit_retargets_open_burst() {
        let backend = CountingBackend::new(Duration::from_millis(10));
        let loader = loader(backend.clone(), 150);
        let ep = Endpoint::aggregated();
        let (a_filters, b_filters) = (tema("A"), tema("B"));

        let cached = loader.load(&ep, &b_filters).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let first = loader.load(&ep, &a_filters);
        let second = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            loader.load(&ep, &b_filters).await
        };
        let (a, b) = tokio::join!(first, second);

        // The burst resolves against the cache with B; A never reaches the backend
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.status, LoadStatus::Cached);
        assert_eq!(a.filters, b_filters);
        assert_eq!(a.status, LoadStatus::Cached);
        assert!(Arc::ptr_eq(&a.result, &cached.result));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_superseded_before_arrival_is_discarded() {
        let backend = CountingBackend::new(Duration::from_millis(500));
        let loader = loader(backend.clone(), 0);
        let ep = Endpoint::aggregated();
        let (a_filters, b_filters) = (tema("A"), tema("B"));

        // A lands at 500ms, after B was issued at 200ms but before B lands at 700ms
        let (old, new) = tokio::join!(loader.load(&ep, &a_filters), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            loader.load(&ep, &b_filters).await
        });

        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(new.sequence, 2);
        assert_eq!(old.sequence, 2);
        assert_eq!(old.filters, b_filters);
        assert!(Arc::ptr_eq(&old.result, &new.result));
        assert_eq!(loader.stats().discarded, 1);
        assert!(loader.cache().get(&ep, &a_filters).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_history_is_empty() {
        let backend = CountingBackend::new(Duration::from_millis(1));
        backend.fail.store(true, Ordering::SeqCst);
        let loader = loader(backend, 0);

        let loaded = loader.load(&Endpoint::aggregated(), &tema("A")).await;
        assert_eq!(loaded.status, LoadStatus::Empty);
        assert!(loaded.result.is_empty());
        assert_eq!(loader.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_falls_back_to_last_known_good() {
        let backend = CountingBackend::new(Duration::from_millis(1));
        let loader = loader(backend.clone(), 0);
        let ep = Endpoint::aggregated();

        let good = loader.load(&ep, &tema("A")).await;
        backend.fail.store(true, Ordering::SeqCst);
        let degraded = loader.load(&ep, &tema("B")).await;

        assert_eq!(degraded.status, LoadStatus::Stale);
        assert!(Arc::ptr_eq(&good.result, &degraded.result));
        assert_eq!(degraded.filters, tema("A"));
        // Failures never populate the cache
        assert!(loader.cache().get(&ep, &tema("B")).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_phase_transitions() {
        let backend = CountingBackend::new(Duration::from_millis(100));
        let loader = loader(backend, 150);
        let ep = Endpoint::aggregated();
        assert_eq!(loader.phase(&ep), LoaderPhase::Idle);

        let handle = {
            let loader = loader.clone();
            let ep = ep.clone();
            tokio::spawn(async move { loader.load(&ep, &tema("A")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.phase(&ep), LoaderPhase::Debouncing);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(loader.phase(&ep), LoaderPhase::Fetching);

        let loaded = handle.await.unwrap();
        assert_eq!(loaded.status, LoadStatus::Fresh);
        assert_eq!(loader.phase(&ep), LoaderPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_ttl_override() {
        let backend = CountingBackend::new(Duration::from_millis(1));
        let ep = Endpoint::aggregated();
        let loader = loader(backend.clone(), 0).with_endpoint_ttl(ep.clone(), Duration::from_secs(1));

        loader.load(&ep, &tema("A")).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        let reloaded = loader.load(&ep, &tema("A")).await;

        assert_eq!(reloaded.status, LoadStatus::Fresh);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
