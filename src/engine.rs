//! Filter Engine
//!
//! The constructor-injected facade pages and chart bindings talk to. It owns
//! both filter fragments, translates gestures and dropdown changes into
//! mutations, recomputes the effective FilterSet and announces it on the bus.
//!
//! Chart bindings need only two entry points:
//! [`FilterEngine::on_element_activated`] and
//! [`FilterEngine::on_element_clear_requested`].

use crate::backend::{AggregationBackend, HttpBackend, ISO_DATE_FIELD};
use crate::cache::{AggregationCache, CacheStatsSnapshot};
use crate::config::Config;
use crate::error::Result;
use crate::filter::{
    merge_filters, FieldMap, FilterSet, FilterState, GestureInterpreter, GestureKind, Modifiers,
    OperatorClass, Predicate, PredicateValue, SnapshotStore, Source,
};
use crate::loader::{FilteredDataLoader, LoaderStatsSnapshot};
use crate::subscription::{
    BusStatsSnapshot, FilterChangeBus, NotifySummary, Subscription, SubscriptionRegistry,
    UpdateOutcome,
};
use crate::types::{FilterValue, PageId};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// UI name of the month dropdown
const MONTH_UI_FIELD: &str = "month";

/// Combined statistics
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Aggregation cache
    pub cache: CacheStatsSnapshot,
    /// Loader
    pub loader: LoaderStatsSnapshot,
    /// Change bus
    pub bus: BusStatsSnapshot,
}

/// Dashboard filter engine
pub struct FilterEngine {
    state: RwLock<FilterState>,
    fields: FieldMap,
    gestures: GestureInterpreter,
    bus: FilterChangeBus,
    snapshots: Option<SnapshotStore>,
}

impl FilterEngine {
    /// Assemble an engine from its collaborators
    pub fn new(
        loader: FilteredDataLoader,
        registry: Arc<SubscriptionRegistry>,
        fields: FieldMap,
        snapshots: Option<SnapshotStore>,
    ) -> Self {
        Self {
            state: RwLock::new(FilterState::new()),
            fields,
            gestures: GestureInterpreter::new(),
            bus: FilterChangeBus::new(registry, loader),
            snapshots,
        }
    }

    /// Build an engine over `backend` configured by `config`
    pub fn with_backend(backend: Arc<dyn AggregationBackend>, config: &Config) -> Self {
        let cache = Arc::new(AggregationCache::new(config.cache.clone()));
        let loader = FilteredDataLoader::new(backend, cache, config.loader.clone());
        let fields = FieldMap::default().extend(config.fields.clone());
        let snapshots = config.snapshot.enabled.then(|| {
            SnapshotStore::new(config.snapshot.dir.clone())
                .with_max_age(chrono::Duration::days(config.snapshot.max_age_days))
        });
        Self::new(loader, Arc::new(SubscriptionRegistry::new()), fields, snapshots)
    }

    /// Build an engine talking HTTP to the configured backend
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.backend)?;
        info!(base_url = %backend.base_url(), "filter engine using HTTP backend");
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Page registry
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        self.bus.registry()
    }

    /// Data loader
    pub fn loader(&self) -> &FilteredDataLoader {
        self.bus.loader()
    }

    /// Field map
    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    /// Register a page; see [`SubscriptionRegistry::subscribe`]
    pub fn subscribe(&self, subscription: Subscription) -> bool {
        self.registry().subscribe(subscription)
    }

    /// Copy of one fragment
    pub fn fragment(&self, source: Source) -> FilterSet {
        self.state.read().fragment(source).clone()
    }

    /// The FilterSet sent to the backend
    pub fn effective_filters(&self) -> FilterSet {
        let state = self.state.read();
        merge_filters(
            state.fragment(Source::PageLocal),
            state.fragment(Source::Crossfilter),
            &self.fields,
        )
    }

    // ------------------------------------------------------------------------
    // Gestures (crossfilter)
    // ------------------------------------------------------------------------

    /// A chart element was clicked
    pub async fn on_element_activated(
        &self,
        field: &str,
        value: impl Into<FilterValue>,
        modifiers: Modifiers,
    ) -> NotifySummary {
        let kind = modifiers.gesture_kind();
        if kind == GestureKind::ClearAll {
            return self.on_element_clear_requested().await;
        }

        let value = value.into();
        let changed = {
            let mut state = self.state.write();
            self.gestures
                .apply(state.fragment_mut(Source::Crossfilter), kind, field, &value)
        };
        self.announce_if(changed).await
    }

    /// Clear every crossfilter predicate; page-local filters are untouched
    pub async fn on_element_clear_requested(&self) -> NotifySummary {
        let changed = self.state.write().clear(Source::Crossfilter);
        self.announce_if(changed).await
    }

    // ------------------------------------------------------------------------
    // Page-local controls
    // ------------------------------------------------------------------------

    /// Set a dropdown value; lists become `in`, scalars `eq`
    ///
    /// The UI field name is translated when written, so `status` is stored
    /// as `statusDemanda`.
    pub async fn set_page_filter(
        &self,
        ui_field: &str,
        value: impl Into<PredicateValue>,
    ) -> NotifySummary {
        let field = self.fields.translate(ui_field).to_string();
        let predicate = Predicate::for_value(field, value.into());
        let changed = {
            let mut state = self.state.write();
            let fragment = state.fragment_mut(Source::PageLocal);
            let before = fragment.get(&predicate.field, predicate.class()).cloned();
            if before.as_ref() == Some(&predicate) {
                false
            } else {
                fragment.upsert(predicate);
                true
            }
        };
        self.announce_if(changed).await
    }

    /// Restrict the creation date to `[from, to]`; `None` leaves that side open
    pub async fn set_page_date_range(
        &self,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> NotifySummary {
        {
            let mut state = self.state.write();
            let fragment = state.fragment_mut(Source::PageLocal);
            match from {
                Some(date) => fragment.upsert(Predicate::gte(ISO_DATE_FIELD, date.format("%Y-%m-%d").to_string())),
                None => {
                    fragment.remove(ISO_DATE_FIELD, OperatorClass::LowerBound);
                },
            }
            match to {
                Some(date) => fragment.upsert(Predicate::lte(ISO_DATE_FIELD, date.format("%Y-%m-%d").to_string())),
                None => {
                    fragment.remove(ISO_DATE_FIELD, OperatorClass::UpperBound);
                },
            }
        }
        self.announce().await
    }

    /// Remove the dropdown for `ui_field`
    pub async fn clear_page_filter(&self, ui_field: &str) -> NotifySummary {
        let field = self.fields.translate(ui_field).to_string();
        let changed = self
            .state
            .write()
            .fragment_mut(Source::PageLocal)
            .remove_field(&field);
        self.announce_if(changed).await
    }

    /// Remove every page-local filter; crossfilter selections are untouched
    pub async fn clear_page_filters(&self) -> NotifySummary {
        let changed = self.state.write().clear(Source::PageLocal);
        self.announce_if(changed).await
    }

    // ------------------------------------------------------------------------
    // Pages
    // ------------------------------------------------------------------------

    /// Wait for `page_id` to register, then pull the current filters into it
    pub async fn show_page(&self, page_id: &PageId) -> Option<UpdateOutcome> {
        self.registry().wait_for_page(page_id).await;
        self.bus.refresh(page_id).await
    }

    /// Months available under the current filters, ignoring the month
    /// dropdown itself
    pub async fn available_months(&self) -> Vec<String> {
        let month_field = self.fields.translate(MONTH_UI_FIELD).to_string();
        let filters = self.effective_filters().without_field(&month_field);
        self.loader().available_months(&filters).await
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Persist the page-local fragment for `page_id`
    ///
    /// Returns false when snapshots are disabled.
    pub fn save_page_snapshot(&self, page_id: &PageId) -> Result<bool> {
        let Some(store) = &self.snapshots else {
            return Ok(false);
        };
        store.save(page_id, &self.fragment(Source::PageLocal))?;
        Ok(true)
    }

    /// Replace the page-local fragment with the snapshot for `page_id`
    ///
    /// Missing, stale or malformed snapshots are ignored and return false.
    pub async fn restore_page_snapshot(&self, page_id: &PageId) -> bool {
        let Some(restored) = self.snapshots.as_ref().and_then(|s| s.restore(page_id)) else {
            debug!(%page_id, "no usable page snapshot");
            return false;
        };
        *self.state.write().fragment_mut(Source::PageLocal) = restored;
        self.announce().await;
        true
    }

    /// Get statistics snapshot
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cache: self.loader().cache().stats(),
            loader: self.loader().stats(),
            bus: self.bus.stats(),
        }
    }

    async fn announce_if(&self, changed: bool) -> NotifySummary {
        if !changed {
            debug!("filters unchanged; no notification");
            return NotifySummary::default();
        }
        self.announce().await
    }

    async fn announce(&self) -> NotifySummary {
        let effective = self.effective_filters();
        let summary = self.bus.notify_filter_change(effective).await;
        if summary.failed > 0 {
            warn!(failed = summary.failed, "some pages failed to render");
        }
        summary
    }
}
