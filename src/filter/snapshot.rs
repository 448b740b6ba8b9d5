//! Page-local filter snapshots
//!
//! Best-effort persistence of the page-local fragment, one JSON file per page
//! id. Snapshots are advisory: anything stale or unreadable is deleted and
//! treated as absent. The crossfilter fragment is never persisted.

use super::set::FilterSet;
use crate::error::SnapshotError;
use crate::types::PageId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default maximum snapshot age
pub const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// On-disk snapshot record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    saved_at: DateTime<Utc>,
    predicates: FilterSet,
}

/// File-backed store for page-local filter snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    max_age: Duration,
}

impl SnapshotStore {
    /// Create a store rooted at `dir` with the default 7-day max age
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::days(DEFAULT_MAX_AGE_DAYS),
        }
    }

    /// Override the maximum age
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Directory holding the snapshots
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, page_id: &PageId) -> Result<PathBuf, SnapshotError> {
        if !page_id.is_file_safe() {
            return Err(SnapshotError::InvalidPageId(page_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", page_id)))
    }

    /// Persist the page-local fragment for a page
    pub fn save(&self, page_id: &PageId, filters: &FilterSet) -> Result<(), SnapshotError> {
        self.save_at(page_id, filters, Utc::now())
    }

    /// Persist with an explicit timestamp
    pub fn save_at(
        &self,
        page_id: &PageId,
        filters: &FilterSet,
        now: DateTime<Utc>,
    ) -> Result<(), SnapshotError> {
        let path = self.path_for(page_id)?;
        std::fs::create_dir_all(&self.dir)?;

        let snapshot = Snapshot {
            saved_at: now,
            predicates: filters.clone(),
        };
        let contents = serde_json::to_vec_pretty(&snapshot)?;

        // Readers never observe a partially written snapshot
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Recall the stored page-local fragment, if present and fresh
    pub fn restore(&self, page_id: &PageId) -> Option<FilterSet> {
        self.restore_at(page_id, Utc::now())
    }

    /// Recall relative to an explicit "now"
    pub fn restore_at(&self, page_id: &PageId, now: DateTime<Utc>) -> Option<FilterSet> {
        let path = self.path_for(page_id).ok()?;
        let contents = std::fs::read(&path).ok()?;

        let snapshot: Snapshot = match serde_json::from_slice(&contents) {
            Ok(s) => s,
            Err(e) => {
                debug!(page_id = %page_id, error = %e, "discarding malformed filter snapshot");
                self.remove_file(&path);
                return None;
            },
        };

        if now - snapshot.saved_at > self.max_age {
            debug!(page_id = %page_id, saved_at = %snapshot.saved_at, "discarding stale filter snapshot");
            self.remove_file(&path);
            return None;
        }

        Some(snapshot.predicates)
    }

    /// Delete a page's snapshot
    pub fn discard(&self, page_id: &PageId) {
        if let Ok(path) = self.path_for(page_id) {
            self.remove_file(&path);
        }
    }

    fn remove_file(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "failed to remove snapshot");
            }
        }
    }
}
