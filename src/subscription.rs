//! Subscription Registry and Filter Change Bus
//!
//! Pages register once with a visibility predicate and a render callback.
//! When the effective FilterSet changes, the bus loads data for every
//! visible page and hands it to the page's callback.
//!
//! # Architecture
//!
//! ```text
//! effective FilterSet
//!         │
//!         ▼
//! ┌─────────────────┐   visible?   ┌────────────────────┐
//! │ FilterChangeBus │ ───────────▶ │ FilteredDataLoader │
//! └────────┬────────┘              └─────────┬──────────┘
//!          │                                 │ Loaded
//!          ▼                                 ▼
//! ┌──────────────────────┐         ┌──────────────────┐
//! │ SubscriptionRegistry │ ──────▶ │ on_filtered_data │  (per page)
//! └──────────────────────┘         └──────────────────┘
//! ```
//!
//! Each subscription carries an update guard. While a page is updating, a
//! further notification does not start a second render. It marks the page
//! pending, and exactly one more pass runs with the latest filters once the
//! current pass ends. Callback errors and panics are contained per page.

use crate::error::RenderError;
use crate::filter::FilterSet;
use crate::loader::{FilteredDataLoader, Loaded};
use crate::types::{Endpoint, PageId};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Visibility predicate
pub type VisibilityFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// Render callback
pub type RenderFn = Arc<dyn Fn(&Loaded) -> Result<(), RenderError> + Send + Sync>;

// ============================================================================
// Subscription
// ============================================================================

/// A page's registration
#[derive(Clone)]
pub struct Subscription {
    page_id: PageId,
    endpoints: Vec<Endpoint>,
    is_visible: VisibilityFn,
    on_filtered_data: RenderFn,
}

impl Subscription {
    /// Subscribe `page_id` to the aggregated endpoint
    pub fn new<V, R>(page_id: impl Into<PageId>, is_visible: V, on_filtered_data: R) -> Self
    where
        V: Fn() -> bool + Send + Sync + 'static,
        R: Fn(&Loaded) -> Result<(), RenderError> + Send + Sync + 'static,
    {
        Self {
            page_id: page_id.into(),
            endpoints: vec![Endpoint::aggregated()],
            is_visible: Arc::new(is_visible),
            on_filtered_data: Arc::new(on_filtered_data),
        }
    }

    /// Replace the endpoints this page renders from
    pub fn with_endpoints(mut self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        self.endpoints = endpoints.into_iter().collect();
        self
    }

    /// Page identifier
    pub fn page_id(&self) -> &PageId {
        &self.page_id
    }

    /// Endpoints loaded for this page
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Evaluate the visibility predicate; a panicking predicate counts as hidden
    pub fn is_visible(&self) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.is_visible)())) {
            Ok(visible) => visible,
            Err(_) => {
                error!(page_id = %self.page_id, "visibility check panicked; treating page as hidden");
                false
            },
        }
    }

    /// Invoke the render callback, containing errors and panics
    fn deliver(&self, loaded: &Loaded) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.on_filtered_data)(loaded))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(page_id = %self.page_id, endpoint = %loaded.endpoint, error = %e, "subscriber render failed");
                false
            },
            Err(_) => {
                error!(page_id = %self.page_id, endpoint = %loaded.endpoint, "subscriber render panicked");
                false
            },
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("page_id", &self.page_id)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Update guard
// ============================================================================

#[derive(Default)]
struct UpdateGuard {
    /// A pass is running
    updating: bool,
    /// A change arrived during the running pass
    pending: bool,
    /// Filters of the last delivery per endpoint
    rendered: HashMap<Endpoint, FilterSet>,
}

impl UpdateGuard {
    fn is_current(&self, endpoints: &[Endpoint], filters: &FilterSet) -> bool {
        endpoints
            .iter()
            .all(|ep| self.rendered.get(ep) == Some(filters))
    }
}

#[derive(Clone)]
struct Slot {
    subscription: Arc<Subscription>,
    guard: Arc<Mutex<UpdateGuard>>,
}

// ============================================================================
// Registry
// ============================================================================

/// Pages keyed by id
pub struct SubscriptionRegistry {
    slots: RwLock<HashMap<PageId, Slot>>,

    /// Bumped on every registration
    registrations: watch::Sender<u64>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (registrations, _) = watch::channel(0);
        Self {
            slots: RwLock::new(HashMap::new()),
            registrations,
        }
    }

    /// Register a page, replacing any previous registration for its id
    ///
    /// The replacement keeps the page's update guard so a pass already
    /// running for the old callback still blocks overlapping renders.
    /// Returns true if an earlier registration was replaced.
    pub fn subscribe(&self, subscription: Subscription) -> bool {
        let page_id = subscription.page_id.clone();
        let subscription = Arc::new(subscription);

        let replaced = {
            let mut slots = self.slots.write();
            match slots.get_mut(&page_id) {
                Some(slot) => {
                    slot.subscription = subscription;
                    true
                },
                None => {
                    slots.insert(
                        page_id.clone(),
                        Slot {
                            subscription,
                            guard: Arc::new(Mutex::new(UpdateGuard::default())),
                        },
                    );
                    false
                },
            }
        };

        if replaced {
            debug!(%page_id, "subscription replaced");
        } else {
            info!(%page_id, "page registered");
        }
        self.registrations.send_modify(|n| *n += 1);
        replaced
    }

    /// Registration for `page_id`
    pub fn get(&self, page_id: &PageId) -> Option<Arc<Subscription>> {
        self.slots
            .read()
            .get(page_id)
            .map(|s| Arc::clone(&s.subscription))
    }

    /// Whether `page_id` has registered
    pub fn contains(&self, page_id: &PageId) -> bool {
        self.slots.read().contains_key(page_id)
    }

    /// Number of registered pages
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// True if no page has registered
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Registered page ids, sorted
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.slots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Resolve once `page_id` has registered
    pub async fn wait_for_page(&self, page_id: &PageId) {
        let mut registrations = self.registrations.subscribe();
        while !self.contains(page_id) {
            // The sender lives as long as `self`
            if registrations.changed().await.is_err() {
                return;
            }
        }
    }

    fn slot(&self, page_id: &PageId) -> Option<Slot> {
        self.slots.read().get(page_id).cloned()
    }

    fn slots(&self) -> Vec<Slot> {
        self.slots.read().values().cloned().collect()
    }
}

// ============================================================================
// Bus
// ============================================================================

/// What a notification did for one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    /// Every endpoint was delivered
    Rendered,
    /// At least one delivery failed
    Failed,
    /// The page was already updating; the change was queued
    Coalesced,
    /// The page is hidden
    Hidden,
}

/// Per-notification summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotifySummary {
    /// Pages rendered without error
    pub rendered: usize,
    /// Pages with a failed delivery
    pub failed: usize,
    /// Pages whose update was queued behind a running one
    pub coalesced: usize,
    /// Hidden pages skipped
    pub hidden: usize,
}

impl NotifySummary {
    fn record(&mut self, outcome: UpdateOutcome) {
        match outcome {
            UpdateOutcome::Rendered => self.rendered += 1,
            UpdateOutcome::Failed => self.failed += 1,
            UpdateOutcome::Coalesced => self.coalesced += 1,
            UpdateOutcome::Hidden => self.hidden += 1,
        }
    }
}

#[derive(Debug, Default)]
struct BusStats {
    notifications: AtomicU64,
    deliveries: AtomicU64,
    render_failures: AtomicU64,
    coalesced: AtomicU64,
    skipped_hidden: AtomicU64,
}

/// Point-in-time bus statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct BusStatsSnapshot {
    /// Filter changes announced
    pub notifications: u64,
    /// Callback invocations
    pub deliveries: u64,
    /// Callback invocations that errored or panicked
    pub render_failures: u64,
    /// Notifications queued behind a running update
    pub coalesced: u64,
    /// Hidden pages skipped
    pub skipped_hidden: u64,
}

/// Dispatches filter changes to visible subscribers
pub struct FilterChangeBus {
    registry: Arc<SubscriptionRegistry>,
    loader: FilteredDataLoader,
    current: RwLock<FilterSet>,
    stats: BusStats,
}

impl FilterChangeBus {
    /// Create a bus over `registry` loading through `loader`
    pub fn new(registry: Arc<SubscriptionRegistry>, loader: FilteredDataLoader) -> Self {
        Self {
            registry,
            loader,
            current: RwLock::new(FilterSet::new()),
            stats: BusStats::default(),
        }
    }

    /// The registry
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// The loader
    pub fn loader(&self) -> &FilteredDataLoader {
        &self.loader
    }

    /// Last announced effective FilterSet
    pub fn current(&self) -> FilterSet {
        self.current.read().clone()
    }

    /// Announce a new effective FilterSet
    ///
    /// Visible pages are updated concurrently; hidden pages are skipped and
    /// pull the current filters when shown. Never fails.
    pub async fn notify_filter_change(&self, effective: FilterSet) -> NotifySummary {
        self.stats.notifications.fetch_add(1, Ordering::Relaxed);
        debug!(filters = %effective, "filter change");
        *self.current.write() = effective;

        let outcomes = join_all(self.registry.slots().into_iter().map(|slot| self.update(slot))).await;

        let mut summary = NotifySummary::default();
        for outcome in outcomes {
            summary.record(outcome);
        }
        summary
    }

    /// Update one page with the current filters (pull-on-show)
    ///
    /// Returns `None` if the page has not registered.
    pub async fn refresh(&self, page_id: &PageId) -> Option<UpdateOutcome> {
        let slot = self.registry.slot(page_id)?;
        Some(self.update(slot).await)
    }

    async fn update(&self, slot: Slot) -> UpdateOutcome {
        let Slot {
            subscription: initial,
            guard,
        } = slot;

        if !initial.is_visible() {
            self.stats.skipped_hidden.fetch_add(1, Ordering::Relaxed);
            return UpdateOutcome::Hidden;
        }

        {
            let mut g = guard.lock();
            if g.updating {
                g.pending = true;
                drop(g);
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                let filters = self.current();
                for endpoint in initial.endpoints() {
                    self.loader.retarget(endpoint, &filters);
                }
                debug!(page_id = %initial.page_id(), "update in progress; change queued");
                return UpdateOutcome::Coalesced;
            }
            g.updating = true;
        }

        loop {
            // Pick up a replacement registered since the last pass
            let subscription = self
                .registry
                .get(initial.page_id())
                .unwrap_or_else(|| Arc::clone(&initial));
            let filters = self.current();

            let loads = join_all(
                subscription
                    .endpoints()
                    .iter()
                    .map(|endpoint| self.loader.load(endpoint, &filters)),
            )
            .await;

            let mut failed = false;
            for loaded in &loads {
                self.stats.deliveries.fetch_add(1, Ordering::Relaxed);
                if !subscription.deliver(loaded) {
                    self.stats.render_failures.fetch_add(1, Ordering::Relaxed);
                    failed = true;
                }
                guard
                    .lock()
                    .rendered
                    .insert(loaded.endpoint.clone(), loaded.filters.clone());
            }
            let outcome = if failed {
                UpdateOutcome::Failed
            } else {
                UpdateOutcome::Rendered
            };

            let mut g = guard.lock();
            if !g.pending {
                g.updating = false;
                break outcome;
            }
            g.pending = false;
            let latest = self.current();
            if g.is_current(subscription.endpoints(), &latest) || !subscription.is_visible() {
                g.updating = false;
                break outcome;
            }
            debug!(page_id = %subscription.page_id(), "running queued update");
        }
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> BusStatsSnapshot {
        let s = &self.stats;
        BusStatsSnapshot {
            notifications: s.notifications.load(Ordering::Relaxed),
            deliveries: s.deliveries.load(Ordering::Relaxed),
            render_failures: s.render_failures.load(Ordering::Relaxed),
            coalesced: s.coalesced.load(Ordering::Relaxed),
            skipped_hidden: s.skipped_hidden.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
