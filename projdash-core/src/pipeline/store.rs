//! Persistence seam used by the orchestrator.

use std::collections::HashMap;

use crate::db::{
    Database, DerivedRecord, EnrichmentRecord, GitHubRecord, MetadataFill, PruneReport, ScanRecord,
    UpsertProject,
};
use crate::error::Result;

/// Writes a refresh needs. Every operation is an idempotent upsert keyed by
/// project id, except the append-only activity log.
///
/// Methods are synchronous and may block briefly on the database lock.
pub trait ProjectStore: Send + Sync {
    /// Previous `last_touched_at` per project id, used for ordering.
    fn last_touched(&self) -> Result<HashMap<String, i64>>;

    /// Soft-prune ids absent from `present`; restore pruned ids that reappear.
    fn reconcile_pruned(&self, present: &[String], now: i64) -> Result<PruneReport>;

    /// Project, scan and derived rows in one transaction. `None` for
    /// `derived` clears any earlier scores.
    fn store_scan_result(
        &self,
        project: &UpsertProject,
        scan: &ScanRecord,
        derived: Option<&DerivedRecord>,
        now: i64,
    ) -> Result<()>;

    fn upsert_github(&self, github: &GitHubRecord) -> Result<()>;

    fn previous_summary(&self, project_id: &str) -> Result<Option<String>>;

    fn upsert_enrichment(&self, enrichment: &EnrichmentRecord, now: i64) -> Result<()>;

    fn record_enrichment_error(&self, project_id: &str, error: &str, now: i64) -> Result<()>;

    /// Returns the number of metadata fields changed.
    fn fill_metadata(
        &self,
        project_id: &str,
        fill: &MetadataFill,
        overwrite: bool,
        now: i64,
    ) -> Result<usize>;

    fn append_activity(
        &self,
        project_id: &str,
        kind: &str,
        payload: &serde_json::Value,
        now: i64,
    ) -> Result<String>;

    fn purge_activity_before(&self, cutoff: i64) -> Result<usize>;
}

impl ProjectStore for Database {
    fn last_touched(&self) -> Result<HashMap<String, i64>> {
        Database::last_touched(self)
    }

    fn reconcile_pruned(&self, present: &[String], now: i64) -> Result<PruneReport> {
        Database::reconcile_pruned(self, present, now)
    }

    fn store_scan_result(
        &self,
        project: &UpsertProject,
        scan: &ScanRecord,
        derived: Option<&DerivedRecord>,
        now: i64,
    ) -> Result<()> {
        Database::store_scan_result(self, project, scan, derived, now)
    }

    fn upsert_github(&self, github: &GitHubRecord) -> Result<()> {
        Database::upsert_github(self, github)
    }

    fn previous_summary(&self, project_id: &str) -> Result<Option<String>> {
        Database::previous_summary(self, project_id)
    }

    fn upsert_enrichment(&self, enrichment: &EnrichmentRecord, now: i64) -> Result<()> {
        Database::upsert_enrichment(self, enrichment, now)
    }

    fn record_enrichment_error(&self, project_id: &str, error: &str, now: i64) -> Result<()> {
        Database::record_enrichment_error(self, project_id, error, now)
    }

    fn fill_metadata(
        &self,
        project_id: &str,
        fill: &MetadataFill,
        overwrite: bool,
        now: i64,
    ) -> Result<usize> {
        Database::fill_metadata(self, project_id, fill, overwrite, now)
    }

    fn append_activity(
        &self,
        project_id: &str,
        kind: &str,
        payload: &serde_json::Value,
        now: i64,
    ) -> Result<String> {
        Database::append_activity(self, project_id, kind, payload, now)
    }

    fn purge_activity_before(&self, cutoff: i64) -> Result<usize> {
        Database::purge_activity_before(self, cutoff)
    }
}
