//! Aggregation result types
//!
//! `AggregationResult` is the one canonical shape every subscriber receives.
//! All top-level keys are always present: missing breakdowns are empty lists
//! and a missing total is zero, so renderers only need to guard nested fields.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Dimensions
// ============================================================================

/// Per-dimension breakdowns carried by an aggregation result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dimension {
    /// Manifestation status (ABERTO, FECHADO, ...)
    Status,
    /// Theme (Saúde, Iluminação Pública, ...)
    Theme,
    /// Subject within a theme
    Subject,
    /// Manifestation type (Reclamação, Elogio, ...)
    Type,
    /// Registering unit
    Unit,
    /// Intake channel
    Channel,
    /// Priority
    Priority,
    /// Creation month (`YYYY-MM`)
    Month,
    /// Responsible organ / department
    Organ,
}

impl Dimension {
    /// All dimensions in display order
    pub const ALL: [Dimension; 9] = [
        Dimension::Status,
        Dimension::Theme,
        Dimension::Subject,
        Dimension::Type,
        Dimension::Unit,
        Dimension::Channel,
        Dimension::Priority,
        Dimension::Month,
        Dimension::Organ,
    ];

    /// Canonical JSON key for the breakdown
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::Status => "byStatus",
            Dimension::Theme => "byTheme",
            Dimension::Subject => "bySubject",
            Dimension::Type => "byType",
            Dimension::Unit => "byUnit",
            Dimension::Channel => "byChannel",
            Dimension::Priority => "byPriority",
            Dimension::Month => "byMonth",
            Dimension::Organ => "byOrgan",
        }
    }

    /// Legacy keys older backend versions use for the same breakdown
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Dimension::Status => &["byStatusDemanda", "status"],
            Dimension::Theme => &["byTema", "temas"],
            Dimension::Subject => &["byAssunto", "assuntos"],
            Dimension::Type => &["byTipo", "tipos"],
            Dimension::Unit => &["byUnidade", "unidades"],
            Dimension::Channel => &["byCanal", "canais"],
            Dimension::Priority => &["byPrioridade", "prioridades"],
            Dimension::Month => &["byMes", "meses"],
            Dimension::Organ => &["byOrgao", "byOrgaos", "orgaos"],
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Buckets
// ============================================================================

/// One labelled count within a breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// Label (theme name, status, month, ...)
    pub key: String,
    /// Number of manifestations
    pub count: u64,
}

impl Bucket {
    /// Create a bucket
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

// ============================================================================
// Aggregation Result
// ============================================================================

/// Normalized aggregation payload handed to subscribers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationResult {
    /// Total number of manifestations matching the filters
    pub total: u64,
    /// Breakdown by status
    pub by_status: Vec<Bucket>,
    /// Breakdown by theme
    pub by_theme: Vec<Bucket>,
    /// Breakdown by subject
    pub by_subject: Vec<Bucket>,
    /// Breakdown by manifestation type
    pub by_type: Vec<Bucket>,
    /// Breakdown by registering unit
    pub by_unit: Vec<Bucket>,
    /// Breakdown by intake channel
    pub by_channel: Vec<Bucket>,
    /// Breakdown by priority
    pub by_priority: Vec<Bucket>,
    /// Breakdown by creation month
    pub by_month: Vec<Bucket>,
    /// Breakdown by responsible organ
    pub by_organ: Vec<Bucket>,
}

impl AggregationResult {
    /// The defined-empty shape: zero total, every breakdown empty
    pub fn empty() -> Self {
        Self::default()
    }

    /// True if nothing matched
    pub fn is_empty(&self) -> bool {
        self.total == 0 && Dimension::ALL.iter().all(|d| self.dimension(*d).is_empty())
    }

    /// Borrow one breakdown
    pub fn dimension(&self, dim: Dimension) -> &[Bucket] {
        match dim {
            Dimension::Status => &self.by_status,
            Dimension::Theme => &self.by_theme,
            Dimension::Subject => &self.by_subject,
            Dimension::Type => &self.by_type,
            Dimension::Unit => &self.by_unit,
            Dimension::Channel => &self.by_channel,
            Dimension::Priority => &self.by_priority,
            Dimension::Month => &self.by_month,
            Dimension::Organ => &self.by_organ,
        }
    }

    /// Mutably borrow one breakdown
    pub fn dimension_mut(&mut self, dim: Dimension) -> &mut Vec<Bucket> {
        match dim {
            Dimension::Status => &mut self.by_status,
            Dimension::Theme => &mut self.by_theme,
            Dimension::Subject => &mut self.by_subject,
            Dimension::Type => &mut self.by_type,
            Dimension::Unit => &mut self.by_unit,
            Dimension::Channel => &mut self.by_channel,
            Dimension::Priority => &mut self.by_priority,
            Dimension::Month => &mut self.by_month,
            Dimension::Organ => &mut self.by_organ,
        }
    }

    /// Count for a label within a breakdown (0 if absent)
    pub fn count_for(&self, dim: Dimension, key: &str) -> u64 {
        self.dimension(dim)
            .iter()
            .find(|b| b.key == key)
            .map(|b| b.count)
            .unwrap_or(0)
    }

    /// Render as a plain-text KPI table
    pub fn to_table(&self) -> String {
        let mut output = format!("Total: {}\n", self.total);
        for dim in Dimension::ALL {
            let buckets = self.dimension(dim);
            if buckets.is_empty() {
                continue;
            }
            output.push_str(&format!("\n{}\n", dim));
            let width = buckets.iter().map(|b| b.key.chars().count()).max().unwrap_or(0);
            for b in buckets {
                output.push_str(&format!("  {:<width$}  {:>8}\n", b.key, b.count, width = width));
            }
        }
        output
    }
}
