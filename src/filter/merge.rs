//! Filter merging
//!
//! Combines the page-local fragment with the crossfilter fragment into the
//! effective FilterSet sent to the backend. Page-local predicates come first,
//! verbatim. Crossfilter predicates are translated from UI field names to
//! backend field names and appended, unless the translated field already has a
//! page-local predicate: the dropdown wins and the click is suppressed.

use super::predicate::Predicate;
use super::set::FilterSet;
use std::collections::HashMap;
use tracing::trace;

/// Default UI → backend field names
const DEFAULT_FIELD_MAP: &[(&str, &str)] = &[
    ("status", "statusDemanda"),
    ("unidade", "unidadeCadastro"),
    ("tipo", "tipoDeManifestacao"),
    ("orgao", "orgaos"),
    ("secretaria", "orgaos"),
    ("mes", "mesCriacao"),
    ("month", "mesCriacao"),
    ("data", "dataCriacaoIso"),
];

// ============================================================================
// Field Map
// ============================================================================

/// Static translation from UI field names to backend field names
///
/// Unknown names translate to themselves, so `tema` stays `tema`.
#[derive(Debug, Clone)]
pub struct FieldMap {
    map: HashMap<String, String>,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            map: DEFAULT_FIELD_MAP
                .iter()
                .map(|(ui, backend)| (ui.to_string(), backend.to_string()))
                .collect(),
        }
    }
}

impl FieldMap {
    /// Empty map (identity translation)
    pub fn identity() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Add or override a mapping
    pub fn with(mut self, ui_field: impl Into<String>, backend_field: impl Into<String>) -> Self {
        self.map.insert(ui_field.into(), backend_field.into());
        self
    }

    /// Extend with extra mappings (config overrides win)
    pub fn extend<I, K, V>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in entries {
            self.map.insert(k.into(), v.into());
        }
        self
    }

    /// Translate a UI field name to the backend field name
    pub fn translate<'a>(&'a self, ui_field: &'a str) -> &'a str {
        self.map.get(ui_field).map(String::as_str).unwrap_or(ui_field)
    }
}

// ============================================================================
// Merge
// ============================================================================

/// Merge page-local and crossfilter fragments into the effective FilterSet
///
/// Pure function of its inputs.
pub fn merge_filters(page_local: &FilterSet, crossfilter: &FilterSet, fields: &FieldMap) -> FilterSet {
    let mut merged = page_local.clone();

    for predicate in crossfilter {
        let backend_field = fields.translate(&predicate.field);

        if page_local.has_field(backend_field) {
            trace!(
                field = %predicate.field,
                backend_field,
                "crossfilter predicate suppressed by page-local filter"
            );
            continue;
        }

        merged.upsert(Predicate::for_value(backend_field, predicate.value.clone()));
    }

    merged
}
