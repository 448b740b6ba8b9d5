//! Subscription Integration Tests
//!
//! Per-page isolation on the change bus: failing pages, re-registration and
//! degraded deliveries.

mod common;

use common::{engine_with, MockBackend};
use ouvidoria_dash::{
    error::RenderError, LoadStatus, Loaded, Modifiers, PageId, Subscription,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counter_page(id: &str, count: Arc<AtomicUsize>) -> Subscription {
    Subscription::new(id, || true, move |_: &Loaded| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

#[tokio::test]
async fn test_render_failures_are_contained() {
    let engine = engine_with(MockBackend::new(), 0);
    let healthy = Arc::new(AtomicUsize::new(0));

    engine.subscribe(Subscription::new("erroring", || true, |_: &Loaded| {
        Err(RenderError::new("canvas not mounted"))
    }));
    engine.subscribe(Subscription::new("panicking", || true, |loaded: &Loaded| {
        // Renderer bug: indexes an empty breakdown
        let _ = loaded.result.by_organ[0].count;
        Ok(())
    }));
    engine.subscribe(counter_page("healthy", healthy.clone()));

    let summary = engine.on_element_activated("tema", "Saúde", Modifiers::none()).await;

    assert_eq!(summary.rendered, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(healthy.load(Ordering::SeqCst), 1);

    // The bus keeps working after failures
    let summary = engine.on_element_clear_requested().await;
    assert_eq!(summary.rendered, 1);
    assert_eq!(healthy.load(Ordering::SeqCst), 2);
    assert_eq!(engine.stats().bus.render_failures, 4);
}

#[tokio::test]
async fn test_reinitialized_page_renders_once() {
    let engine = engine_with(MockBackend::new(), 0);
    let old = Arc::new(AtomicUsize::new(0));
    let new = Arc::new(AtomicUsize::new(0));

    engine.subscribe(counter_page("overview", old.clone()));
    // Page scripts initialized a second time
    assert!(engine.subscribe(counter_page("overview", new.clone())));

    engine.set_page_filter("status", "ABERTO").await;

    assert_eq!(old.load(Ordering::SeqCst), 0);
    assert_eq!(new.load(Ordering::SeqCst), 1);
    assert_eq!(engine.registry().page_ids(), vec![PageId::new("overview")]);
}

#[tokio::test]
async fn test_backend_outage_still_delivers_defined_shape() {
    let backend = MockBackend::new();
    backend.set_failing(true);
    let engine = engine_with(backend, 0);

    let statuses = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = statuses.clone();
    engine.subscribe(Subscription::new("overview", || true, move |loaded: &Loaded| {
        assert_eq!(loaded.result.total, 0);
        assert!(loaded.result.by_theme.is_empty());
        sink.lock().push(loaded.status);
        Ok(())
    }));

    let summary = engine.set_page_filter("status", "ABERTO").await;
    assert_eq!(summary.rendered, 1);
    assert_eq!(*statuses.lock(), vec![LoadStatus::Empty]);
}
