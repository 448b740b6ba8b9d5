//! Filter Engine Integration Tests
//!
//! End-to-end behaviour of the engine facade: dropdowns, chart clicks, the
//! change bus and the loader working together against a mock backend.
//!
//! # Test Coverage
//!
//! 1. **Dropdown precedence** - page-local filters suppress conflicting clicks
//! 2. **Debounced clicks** - rapid clicks reach the backend once
//! 3. **Clear scopes** - clearing the crossfilter keeps dropdowns
//! 4. **Pull-on-show** - hidden pages fetch only when shown
//! 5. **Available months** - month options ignore the month dropdown
//! 6. **Snapshots** - page-local filters survive a restart

mod common;

use common::{engine_with, test_config, MockBackend};
use ouvidoria_dash::{
    filter::Source, Endpoint, FilterEngine, FilterSet, LoadStatus, Loaded, Modifiers, PageId,
    Predicate, Subscription,
};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const THEME: &str = "Iluminação Pública";

/// Register a page that records every delivery
fn recording_page(engine: &FilterEngine, id: &str, visible: Arc<AtomicBool>) -> Arc<Mutex<Vec<Loaded>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    engine.subscribe(Subscription::new(
        id,
        move || visible.load(Ordering::SeqCst),
        move |loaded: &Loaded| {
            sink.lock().push(loaded.clone());
            Ok(())
        },
    ));
    seen
}

// =============================================================================
// Dropdown precedence
// =============================================================================

#[tokio::test]
async fn test_dropdown_then_click_accumulates() {
    let engine = engine_with(MockBackend::new(), 0);

    engine.set_page_filter("status", "ABERTO").await;
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;

    assert_eq!(
        engine.effective_filters(),
        FilterSet::from_predicates([
            Predicate::eq("statusDemanda", "ABERTO"),
            Predicate::eq("tema", THEME),
        ])
    );
}

#[tokio::test]
async fn test_conflicting_click_is_suppressed_by_dropdown() {
    let engine = engine_with(MockBackend::new(), 0);

    engine.set_page_filter("status", "ABERTO").await;
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;
    engine.on_element_activated("status", "FECHADO", Modifiers::none()).await;

    assert_eq!(
        engine.effective_filters().predicates(),
        &[
            Predicate::eq("statusDemanda", "ABERTO"),
            Predicate::eq("tema", THEME),
        ]
    );
    // The click is remembered in its own fragment, only merged away
    assert!(engine.fragment(Source::Crossfilter).has_field("status"));
}

#[tokio::test]
async fn test_multi_select_toggle_returns_to_start() {
    let engine = engine_with(MockBackend::new(), 0);
    engine.on_element_activated("tema", "A", Modifiers::multi()).await;
    let before = engine.fragment(Source::Crossfilter);
    assert_eq!(before.predicates(), &[Predicate::one_of("tema", vec!["A".into()])]);

    engine.on_element_activated("tema", "B", Modifiers::multi()).await;
    assert_eq!(
        engine.effective_filters().predicates(),
        &[Predicate::one_of("tema", vec!["A".into(), "B".into()])]
    );

    engine.on_element_activated("tema", "B", Modifiers::multi()).await;
    assert_eq!(engine.fragment(Source::Crossfilter), before);

    // Removing the last value drops the predicate entirely
    engine.on_element_activated("tema", "A", Modifiers::multi()).await;
    assert!(engine.fragment(Source::Crossfilter).is_empty());
}

#[tokio::test]
async fn test_multi_select_toggle_after_plain_click() {
    let engine = engine_with(MockBackend::new(), 0);
    engine.on_element_activated("tema", "A", Modifiers::none()).await;
    let before = engine.fragment(Source::Crossfilter);

    engine.on_element_activated("tema", "B", Modifiers::multi()).await;
    engine.on_element_activated("tema", "B", Modifiers::multi()).await;

    assert_eq!(engine.fragment(Source::Crossfilter), before);
    assert_eq!(before.predicates(), &[Predicate::eq("tema", "A")]);
}

// =============================================================================
// Debounced clicks
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_rapid_clicks_send_only_the_last() {
    let backend = MockBackend::new().with_delay(Duration::from_millis(10));
    let engine = engine_with(backend.clone(), 150);
    let seen = recording_page(&engine, "overview", Arc::new(AtomicBool::new(true)));

    let first = engine.on_element_activated("tema", "A", Modifiers::none());
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.on_element_activated("tema", "B", Modifiers::none()).await
    };
    tokio::join!(first, second);

    let calls = backend.calls_to(&Endpoint::aggregated());
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], FilterSet::from_predicates([Predicate::eq("tema", "B")]));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].filters, calls[0]);
}

#[tokio::test(start_paused = true)]
async fn test_clicks_outside_window_each_fetch() {
    let backend = MockBackend::new();
    let engine = engine_with(backend.clone(), 150);
    recording_page(&engine, "overview", Arc::new(AtomicBool::new(true)));

    engine.on_element_activated("tema", "A", Modifiers::none()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    engine.on_element_activated("tema", "B", Modifiers::none()).await;

    assert_eq!(backend.calls_to(&Endpoint::aggregated()).len(), 2);
}

// =============================================================================
// Clear scopes
// =============================================================================

#[tokio::test]
async fn test_clear_all_keeps_dropdown() {
    let engine = engine_with(MockBackend::new(), 0);
    engine.set_page_filter("status", "ABERTO").await;
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;

    engine.on_element_clear_requested().await;

    assert_eq!(
        engine.effective_filters(),
        FilterSet::from_predicates([Predicate::eq("statusDemanda", "ABERTO")])
    );
}

#[tokio::test]
async fn test_secondary_click_clears_crossfilter() {
    let engine = engine_with(MockBackend::new(), 0);
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;
    engine.on_element_activated("tema", THEME, Modifiers::secondary()).await;
    assert!(engine.effective_filters().is_empty());
}

#[tokio::test]
async fn test_unchanged_gesture_does_not_notify() {
    let backend = MockBackend::new();
    let engine = engine_with(backend.clone(), 0);
    recording_page(&engine, "overview", Arc::new(AtomicBool::new(true)));

    // Nothing to clear
    let summary = engine.on_element_clear_requested().await;
    assert_eq!(summary.rendered, 0);
    assert_eq!(backend.call_count(), 0);
}

// =============================================================================
// Visibility
// =============================================================================

#[tokio::test]
async fn test_hidden_page_pulls_on_show() {
    let backend = MockBackend::new();
    let engine = engine_with(backend.clone(), 0);
    let visible = Arc::new(AtomicBool::new(false));
    let seen = recording_page(&engine, "temas", visible.clone());

    engine.set_page_filter("status", "ABERTO").await;
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;
    assert!(seen.lock().is_empty());
    assert_eq!(backend.call_count(), 0);

    visible.store(true, Ordering::SeqCst);
    engine.show_page(&PageId::new("temas")).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].filters, engine.effective_filters());
    assert_eq!(seen[0].status, LoadStatus::Fresh);
}

#[tokio::test]
async fn test_show_page_waits_for_registration() {
    let engine = Arc::new(engine_with(MockBackend::new(), 0));

    let show = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.show_page(&PageId::new("late")).await })
    };
    tokio::task::yield_now().await;

    let seen = recording_page(&engine, "late", Arc::new(AtomicBool::new(true)));
    let outcome = show.await.unwrap();

    assert!(outcome.is_some());
    assert_eq!(seen.lock().len(), 1);
}

// =============================================================================
// Available months
// =============================================================================

#[tokio::test]
async fn test_available_months_ignore_month_dropdown() {
    let backend = MockBackend::new();
    backend.set_rows(vec![
        json!({ "dataCriacaoIso": "2025-01-15T10:00:00Z" }),
        json!({ "dataCriacaoIso": "2025-03-02" }),
        json!({ "dataDaCriacao": "20/02/2025" }),
        json!({ "dataCriacaoIso": "2025-03-28" }),
    ]);
    let engine = engine_with(backend.clone(), 0);

    engine.set_page_filter("status", "ABERTO").await;
    engine.set_page_filter("month", "2025-03").await;

    let months = engine.available_months().await;
    assert_eq!(months, vec!["2025-03", "2025-02", "2025-01"]);

    let rows_calls = backend.calls_to(&Endpoint::rows());
    assert_eq!(
        rows_calls,
        vec![FilterSet::from_predicates([Predicate::eq("statusDemanda", "ABERTO")])]
    );
}

#[tokio::test]
async fn test_available_months_degrade_to_empty() {
    let backend = MockBackend::new();
    backend.set_failing(true);
    let engine = engine_with(backend, 0);
    assert!(engine.available_months().await.is_empty());
}

// =============================================================================
// Snapshots
// =============================================================================

#[tokio::test]
async fn test_page_snapshot_survives_restart() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(0);
    config.snapshot.enabled = true;
    config.snapshot.dir = dir.path().to_path_buf();
    let page = PageId::new("overview");

    let engine = FilterEngine::with_backend(MockBackend::new(), &config);
    engine.set_page_filter("status", "ABERTO").await;
    engine.on_element_activated("tema", THEME, Modifiers::none()).await;
    assert!(engine.save_page_snapshot(&page).unwrap());

    let restarted = FilterEngine::with_backend(MockBackend::new(), &config);
    assert!(restarted.restore_page_snapshot(&page).await);

    assert_eq!(
        restarted.fragment(Source::PageLocal),
        FilterSet::from_predicates([Predicate::eq("statusDemanda", "ABERTO")])
    );
    // Crossfilter selections are never persisted
    assert!(restarted.fragment(Source::Crossfilter).is_empty());
}
