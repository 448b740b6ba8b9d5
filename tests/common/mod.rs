//! Shared test fixtures
//!
//! `MockBackend` records every call and can be scripted with per-call delays,
//! forced failures, malformed payloads and row-level records. Aggregated
//! responses carry the canonical form of the filters they were computed for
//! as the single `byTheme` label, so tests can tell which request produced a
//! delivered result.

#![allow(dead_code)]

use async_trait::async_trait;
use ouvidoria_dash::{
    backend::AggregationBackend, config::Config, error::BackendError, AggregationResult, Endpoint,
    FilterEngine, FilterSet,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Scriptable in-memory backend
#[derive(Default)]
pub struct MockBackend {
    calls: Mutex<Vec<(Endpoint, FilterSet)>>,
    delays: Mutex<VecDeque<Duration>>,
    default_delay: Mutex<Duration>,
    counter: AtomicU64,
    failing: AtomicBool,
    malformed: AtomicBool,
    rows: Mutex<Vec<Value>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delay applied when no scripted delay is queued
    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.default_delay.lock() = delay;
        self
    }

    /// Queue delays for the next calls, in call order
    pub fn script_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.delays.lock().extend(delays);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_malformed(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    pub fn set_rows(&self, rows: Vec<Value>) {
        *self.rows.lock() = rows;
    }

    pub fn calls(&self) -> Vec<(Endpoint, FilterSet)> {
        self.calls.lock().clone()
    }

    /// Calls made to one endpoint
    pub fn calls_to(&self, endpoint: &Endpoint) -> Vec<FilterSet> {
        self.calls
            .lock()
            .iter()
            .filter(|(ep, _)| ep == endpoint)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Canonical filters a result was produced for
    pub fn label_of(result: &AggregationResult) -> Option<String> {
        result.by_theme.first().map(|b| b.key.clone())
    }
}

#[async_trait]
impl AggregationBackend for MockBackend {
    async fn fetch(&self, endpoint: &Endpoint, filters: &FilterSet) -> Result<Value, BackendError> {
        self.calls.lock().push((endpoint.clone(), filters.clone()));
        let call = self.counter.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = self
            .delays
            .lock()
            .pop_front()
            .unwrap_or(*self.default_delay.lock());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        if self.malformed.load(Ordering::SeqCst) {
            return Ok(json!("<html>gateway error</html>"));
        }

        if *endpoint == Endpoint::rows() {
            return Ok(Value::Array(self.rows.lock().clone()));
        }

        Ok(json!({
            "total": call,
            "byStatus": [{ "_id": "ABERTO", "count": call }],
            "byTheme": [{ "label": filters.canonical(), "count": 1 }],
        }))
    }
}

/// Configuration with snapshots off and the given debounce window
pub fn test_config(debounce_ms: u64) -> Config {
    let mut config = Config::default();
    config.loader.debounce_ms = debounce_ms;
    config.snapshot.enabled = false;
    config
}

pub fn engine_with(backend: Arc<MockBackend>, debounce_ms: u64) -> FilterEngine {
    FilterEngine::with_backend(backend, &test_config(debounce_ms))
}
