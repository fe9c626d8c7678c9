//! SQLite persistence for the project inventory.
//!
//! Each project owns up to five layer rows (scan, derived, enrichment,
//! override, metadata) plus an append-only activity log. Every write is an
//! upsert keyed by project id, so re-running a refresh is idempotent.
//!
//! Database location priority:
//! 1. PROJDASH_DATABASE_PATH env var
//! 2. `<config dir>/projdash.db`

pub mod migrations;
pub mod types;

pub use types::*;

use crate::error::{Error, Result};
use crate::scoring::ProjectStatus;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON column, falling back to the type's default when corrupt.
fn json_or_default<T: DeserializeOwned + Default>(raw: Option<String>, column: &str) -> T {
    match raw {
        Some(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
            warn!("Ignoring corrupt JSON in {}: {}", column, e);
            T::default()
        }),
        None => T::default(),
    }
}

fn parse_status(raw: Option<String>) -> Option<ProjectStatus> {
    raw.and_then(|s| s.parse().ok())
}

const PROJECT_COLUMNS: &str =
    "id, name, path_display, pinned, last_touched_at, created_at, updated_at, pruned_at";
const DERIVED_COLUMNS: &str = "project_id, status, health_score, hygiene_score, momentum_score,
     score_breakdown, is_dirty, ahead, behind, framework, branch_name, last_commit_date,
     loc_estimate, tags, derived_at";
const ENRICHMENT_COLUMNS: &str = "project_id, summary, next_action, phase, phase_reason, risks,
     recommendations, tags, framework, primary_language, generated_at, error";
const OVERRIDE_COLUMNS: &str = "project_id, status, purpose, tags, notes, updated_at";
const METADATA_COLUMNS: &str =
    "project_id, goal, audience, success_metrics, next_action, publish_target, updated_at";
const GITHUB_COLUMNS: &str = "project_id, open_issues, open_prs, ci_status, issues_top, prs_top,
     repo_visibility, fetched_at";

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open_path(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        info!("Opened database at {}", path.display());
        Self::init(conn)
    }

    /// Open a private in-memory database (tests, dry runs).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Project Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn map_project(row: &rusqlite::Row) -> rusqlite::Result<ProjectRecord> {
        Ok(ProjectRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            path_display: row.get(2)?,
            pinned: row.get(3)?,
            last_touched_at: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            pruned_at: row.get(7)?,
        })
    }

    /// Get project by ID
    pub fn get_project(&self, project_id: &str) -> Result<Option<ProjectRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM project WHERE id = ?1"
        ))?;
        Ok(stmt.query_row(params![project_id], Self::map_project).optional()?)
    }

    /// List projects sorted by name, optionally including pruned ones
    pub fn list_projects(&self, include_pruned: bool) -> Result<Vec<ProjectRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let filter = if include_pruned { "" } else { "WHERE pruned_at IS NULL" };
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM project {filter} ORDER BY name COLLATE NOCASE, id"
        ))?;
        let projects = stmt
            .query_map([], Self::map_project)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// Insert or refresh a project row.
    ///
    /// `last_touched_at` only moves forward, so a user "touch" newer than the
    /// last commit survives later scans.
    pub fn upsert_project(&self, project: &UpsertProject, now: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::write_project(&conn, project, now)
    }

    fn write_project(conn: &Connection, project: &UpsertProject, now: i64) -> Result<()> {
        conn.execute(
            "INSERT INTO project (id, name, path_display, pinned, last_touched_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                path_display = excluded.path_display,
                last_touched_at = CASE
                    WHEN excluded.last_touched_at IS NOT NULL
                         AND (project.last_touched_at IS NULL
                              OR excluded.last_touched_at > project.last_touched_at)
                    THEN excluded.last_touched_at
                    ELSE project.last_touched_at
                END,
                updated_at = excluded.updated_at",
            params![
                project.id,
                project.name,
                project.path_display,
                project.last_touched_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Previous `last_touched_at` for every known project.
    pub fn last_touched(&self) -> Result<HashMap<String, i64>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt =
            conn.prepare("SELECT id, last_touched_at FROM project WHERE last_touched_at IS NOT NULL")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Soft-prune projects missing from `present` and restore pruned ones
    /// that reappeared. Nothing is ever deleted.
    pub fn reconcile_pruned(&self, present: &[String], now: i64) -> Result<PruneReport> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let present: HashSet<&str> = present.iter().map(String::as_str).collect();
        let tx = conn.transaction()?;

        let known: Vec<(String, Option<i64>)> = {
            let mut stmt = tx.prepare("SELECT id, pruned_at FROM project")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut report = PruneReport::default();
        for (id, pruned_at) in known {
            match (present.contains(id.as_str()), pruned_at.is_some()) {
                (false, false) => {
                    tx.execute(
                        "UPDATE project SET pruned_at = ?2, updated_at = ?2 WHERE id = ?1",
                        params![id, now],
                    )?;
                    report.pruned += 1;
                }
                (true, true) => {
                    tx.execute(
                        "UPDATE project SET pruned_at = NULL, updated_at = ?2 WHERE id = ?1",
                        params![id, now],
                    )?;
                    report.restored += 1;
                }
                _ => {}
            }
        }

        tx.commit()?;
        if report.pruned > 0 || report.restored > 0 {
            info!(
                "Reconciled projects: {} pruned, {} restored",
                report.pruned, report.restored
            );
        }
        Ok(report)
    }

    /// Toggle the pin flag. Returns the new value, or None for an unknown id.
    pub fn toggle_pin(&self, project_id: &str, now: i64) -> Result<Option<bool>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let updated = conn.execute(
            "UPDATE project SET pinned = NOT pinned, updated_at = ?2 WHERE id = ?1",
            params![project_id, now],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let pinned = conn.query_row(
            "SELECT pinned FROM project WHERE id = ?1",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(Some(pinned))
    }

    /// Mark a project as just opened. Returns false for an unknown id.
    pub fn touch_project(&self, project_id: &str, now: i64) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let updated = conn.execute(
            "UPDATE project SET last_touched_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![project_id, now],
        )?;
        Ok(updated > 0)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scan & Derived Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn map_scan(row: &rusqlite::Row) -> rusqlite::Result<ScanRecord> {
        Ok(ScanRecord {
            project_id: row.get(0)?,
            raw_json: row.get(1)?,
            raw_json_hash: row.get(2)?,
            scanned_at: row.get(3)?,
        })
    }

    /// Replace the scan layer wholesale
    pub fn upsert_scan(&self, scan: &ScanRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::write_scan(&conn, scan)
    }

    fn write_scan(conn: &Connection, scan: &ScanRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO project_scan (project_id, raw_json, raw_json_hash, scanned_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(project_id) DO UPDATE SET
                raw_json = excluded.raw_json,
                raw_json_hash = excluded.raw_json_hash,
                scanned_at = excluded.scanned_at",
            params![scan.project_id, scan.raw_json, scan.raw_json_hash, scan.scanned_at],
        )?;
        Ok(())
    }

    fn map_derived(row: &rusqlite::Row) -> rusqlite::Result<DerivedRecord> {
        Ok(DerivedRecord {
            project_id: row.get(0)?,
            status: parse_status(row.get(1)?).unwrap_or(ProjectStatus::Archived),
            health_score: row.get(2)?,
            hygiene_score: row.get(3)?,
            momentum_score: row.get(4)?,
            score_breakdown: json_or_default(row.get(5)?, "project_derived.score_breakdown"),
            is_dirty: row.get(6)?,
            ahead: row.get(7)?,
            behind: row.get(8)?,
            framework: row.get(9)?,
            branch_name: row.get(10)?,
            last_commit_date: row.get(11)?,
            loc_estimate: row.get::<_, i64>(12)?.max(0) as u64,
            tags: json_or_default(row.get(13)?, "project_derived.tags"),
            derived_at: row.get(14)?,
        })
    }

    /// Replace the derived layer wholesale
    pub fn upsert_derived(&self, derived: &DerivedRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        Self::write_derived(&conn, derived)
    }

    fn write_derived(conn: &Connection, derived: &DerivedRecord) -> Result<()> {
        let breakdown = to_json(&derived.score_breakdown)?;
        let tags = to_json(&derived.tags)?;
        conn.execute(
            "INSERT INTO project_derived
             (project_id, status, health_score, hygiene_score, momentum_score, score_breakdown,
              is_dirty, ahead, behind, framework, branch_name, last_commit_date, loc_estimate,
              tags, derived_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(project_id) DO UPDATE SET
                status = excluded.status,
                health_score = excluded.health_score,
                hygiene_score = excluded.hygiene_score,
                momentum_score = excluded.momentum_score,
                score_breakdown = excluded.score_breakdown,
                is_dirty = excluded.is_dirty,
                ahead = excluded.ahead,
                behind = excluded.behind,
                framework = excluded.framework,
                branch_name = excluded.branch_name,
                last_commit_date = excluded.last_commit_date,
                loc_estimate = excluded.loc_estimate,
                tags = excluded.tags,
                derived_at = excluded.derived_at",
            params![
                derived.project_id,
                derived.status.as_str(),
                derived.health_score,
                derived.hygiene_score,
                derived.momentum_score,
                breakdown,
                derived.is_dirty,
                derived.ahead,
                derived.behind,
                derived.framework,
                derived.branch_name,
                derived.last_commit_date,
                derived.loc_estimate as i64,
                tags,
                derived.derived_at,
            ],
        )?;
        Ok(())
    }

    /// Commit one project's scan result atomically: project row, scan layer
    /// and derived layer. `derived: None` removes any stale derived row, so a
    /// project that can no longer be scored carries no old scores.
    pub fn store_scan_result(
        &self,
        project: &UpsertProject,
        scan: &ScanRecord,
        derived: Option<&DerivedRecord>,
        now: i64,
    ) -> Result<()> {
        let mut conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let tx = conn.transaction()?;
        Self::write_project(&tx, project, now)?;
        Self::write_scan(&tx, scan)?;
        match derived {
            Some(derived) => Self::write_derived(&tx, derived)?,
            None => {
                tx.execute(
                    "DELETE FROM project_derived WHERE project_id = ?1",
                    params![project.id],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Enrichment Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn map_enrichment(row: &rusqlite::Row) -> rusqlite::Result<EnrichmentRecord> {
        let tags: Option<String> = row.get(7)?;
        Ok(EnrichmentRecord {
            project_id: row.get(0)?,
            summary: row.get(1)?,
            next_action: row.get(2)?,
            phase: row.get(3)?,
            phase_reason: row.get(4)?,
            risks: json_or_default(row.get(5)?, "project_enrichment.risks"),
            recommendations: json_or_default(row.get(6)?, "project_enrichment.recommendations"),
            tags: tags.and_then(|t| serde_json::from_str(&t).ok()),
            framework: row.get(8)?,
            primary_language: row.get(9)?,
            generated_at: row.get(10)?,
            error: row.get(11)?,
        })
    }

    /// Store a successful enrichment, clearing any previous error.
    pub fn upsert_enrichment(&self, enrichment: &EnrichmentRecord, now: i64) -> Result<()> {
        let risks = to_json(&enrichment.risks)?;
        let recommendations = to_json(&enrichment.recommendations)?;
        let tags = enrichment.tags.as_ref().map(to_json).transpose()?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO project_enrichment
             (project_id, summary, next_action, phase, phase_reason, risks, recommendations,
              tags, framework, primary_language, generated_at, error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, NULL, ?12)
             ON CONFLICT(project_id) DO UPDATE SET
                summary = excluded.summary,
                next_action = excluded.next_action,
                phase = excluded.phase,
                phase_reason = excluded.phase_reason,
                risks = excluded.risks,
                recommendations = excluded.recommendations,
                tags = excluded.tags,
                framework = excluded.framework,
                primary_language = excluded.primary_language,
                generated_at = excluded.generated_at,
                error = NULL,
                updated_at = excluded.updated_at",
            params![
                enrichment.project_id,
                enrichment.summary,
                enrichment.next_action,
                enrichment.phase,
                enrichment.phase_reason,
                risks,
                recommendations,
                tags,
                enrichment.framework,
                enrichment.primary_language,
                enrichment.generated_at,
                now,
            ],
        )?;
        Ok(())
    }

    /// Record a failed enrichment without discarding the last good analysis.
    pub fn record_enrichment_error(&self, project_id: &str, error: &str, now: i64) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO project_enrichment (project_id, error, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(project_id) DO UPDATE SET
                error = excluded.error,
                updated_at = excluded.updated_at",
            params![project_id, error, now],
        )?;
        Ok(())
    }

    /// Summary from the last successful enrichment, fed back as context.
    pub fn previous_summary(&self, project_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let summary = conn
            .query_row(
                "SELECT summary FROM project_enrichment WHERE project_id = ?1",
                params![project_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(summary.flatten())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // GitHub Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn map_github(row: &rusqlite::Row) -> rusqlite::Result<GitHubRecord> {
        let ci_status: String = row.get(3)?;
        let visibility: String = row.get(6)?;
        Ok(GitHubRecord {
            project_id: row.get(0)?,
            open_issues: row.get(1)?,
            open_prs: row.get(2)?,
            ci_status: ci_status.parse().unwrap_or_default(),
            issues_top: json_or_default(row.get(4)?, "project_github.issues_top"),
            prs_top: json_or_default(row.get(5)?, "project_github.prs_top"),
            repo_visibility: visibility.parse().unwrap_or_default(),
            fetched_at: row.get(7)?,
        })
    }

    /// Replace the GitHub layer wholesale
    pub fn upsert_github(&self, github: &GitHubRecord) -> Result<()> {
        let issues = to_json(&github.issues_top)?;
        let prs = to_json(&github.prs_top)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO project_github
             (project_id, open_issues, open_prs, ci_status, issues_top, prs_top,
              repo_visibility, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(project_id) DO UPDATE SET
                open_issues = excluded.open_issues,
                open_prs = excluded.open_prs,
                ci_status = excluded.ci_status,
                issues_top = excluded.issues_top,
                prs_top = excluded.prs_top,
                repo_visibility = excluded.repo_visibility,
                fetched_at = excluded.fetched_at",
            params![
                github.project_id,
                github.open_issues,
                github.open_prs,
                github.ci_status.as_str(),
                issues,
                prs,
                github.repo_visibility.as_str(),
                github.fetched_at,
            ],
        )?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Override & Metadata Operations
    // ─────────────────────────────────────────────────────────────────────────

    fn map_override(row: &rusqlite::Row) -> rusqlite::Result<OverrideRecord> {
        let tags: Option<String> = row.get(3)?;
        Ok(OverrideRecord {
            project_id: row.get(0)?,
            status: parse_status(row.get(1)?),
            purpose: row.get(2)?,
            tags: tags.and_then(|t| serde_json::from_str(&t).ok()),
            notes: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn map_metadata(row: &rusqlite::Row) -> rusqlite::Result<MetadataRecord> {
        Ok(MetadataRecord {
            project_id: row.get(0)?,
            goal: row.get(1)?,
            audience: row.get(2)?,
            success_metrics: row.get(3)?,
            next_action: row.get(4)?,
            publish_target: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn query_override(conn: &Connection, project_id: &str) -> Result<Option<OverrideRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {OVERRIDE_COLUMNS} FROM project_override WHERE project_id = ?1"
        ))?;
        Ok(stmt.query_row(params![project_id], Self::map_override).optional()?)
    }

    fn query_metadata(conn: &Connection, project_id: &str) -> Result<Option<MetadataRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {METADATA_COLUMNS} FROM project_metadata WHERE project_id = ?1"
        ))?;
        Ok(stmt.query_row(params![project_id], Self::map_metadata).optional()?)
    }

    fn write_metadata(conn: &Connection, record: &MetadataRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO project_metadata
             (project_id, goal, audience, success_metrics, next_action, publish_target, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(project_id) DO UPDATE SET
                goal = excluded.goal,
                audience = excluded.audience,
                success_metrics = excluded.success_metrics,
                next_action = excluded.next_action,
                publish_target = excluded.publish_target,
                updated_at = excluded.updated_at",
            params![
                record.project_id,
                record.goal,
                record.audience,
                record.success_metrics,
                record.next_action,
                record.publish_target,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Apply a user override patch. Returns the stored record.
    pub fn update_override(
        &self,
        project_id: &str,
        patch: &OverridePatch,
        now: i64,
    ) -> Result<OverrideRecord> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut record = Self::query_override(&conn, project_id)?.unwrap_or_else(|| OverrideRecord {
            project_id: project_id.to_string(),
            ..Default::default()
        });
        patch.apply(&mut record);
        record.updated_at = now;

        let tags = record.tags.as_ref().map(to_json).transpose()?;
        conn.execute(
            "INSERT INTO project_override (project_id, status, purpose, tags, notes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(project_id) DO UPDATE SET
                status = excluded.status,
                purpose = excluded.purpose,
                tags = excluded.tags,
                notes = excluded.notes,
                updated_at = excluded.updated_at",
            params![
                record.project_id,
                record.status.map(|s| s.as_str()),
                record.purpose,
                tags,
                record.notes,
                now,
            ],
        )?;
        Ok(record)
    }

    /// Apply a user metadata patch. Returns the stored record.
    pub fn update_metadata(
        &self,
        project_id: &str,
        patch: &MetadataPatch,
        now: i64,
    ) -> Result<MetadataRecord> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut record = Self::query_metadata(&conn, project_id)?.unwrap_or_else(|| MetadataRecord {
            project_id: project_id.to_string(),
            ..Default::default()
        });
        patch.apply(&mut record);
        record.updated_at = now;
        Self::write_metadata(&conn, &record)?;
        Ok(record)
    }

    /// Write enrichment suggestions into metadata. Without `overwrite` only
    /// empty fields are filled. Returns the number of fields changed.
    pub fn fill_metadata(
        &self,
        project_id: &str,
        fill: &MetadataFill,
        overwrite: bool,
        now: i64,
    ) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut record = Self::query_metadata(&conn, project_id)?.unwrap_or_else(|| MetadataRecord {
            project_id: project_id.to_string(),
            ..Default::default()
        });
        let changed = fill.apply(&mut record, overwrite);
        if changed > 0 {
            record.updated_at = now;
            Self::write_metadata(&conn, &record)?;
            debug!("Filled {} metadata fields for {}", changed, project_id);
        }
        Ok(changed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Activity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an activity entry. Returns its id.
    pub fn append_activity(
        &self,
        project_id: &str,
        kind: &str,
        payload: &serde_json::Value,
        now: i64,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let payload = to_json(payload)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO activity (id, project_id, kind, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, project_id, kind, payload, now],
        )?;
        Ok(id)
    }

    /// Most recent activity for a project, newest first
    pub fn list_activity(&self, project_id: &str, limit: usize) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, kind, payload, created_at
             FROM activity WHERE project_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![project_id, limit as i64], |row| {
                Ok(ActivityRecord {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    kind: row.get(2)?,
                    payload: json_or_default(row.get(3)?, "activity.payload"),
                    created_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Delete activity created before `cutoff`. Returns rows removed.
    pub fn purge_activity_before(&self, cutoff: i64) -> Result<usize> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let removed = conn.execute("DELETE FROM activity WHERE created_at < ?1", params![cutoff])?;
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Layer Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// All five layers for one project, or None for an unknown id.
    pub fn get_layers(&self, project_id: &str) -> Result<Option<ProjectLayers>> {
        let Some(project) = self.get_project(project_id)? else {
            return Ok(None);
        };
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        let scan = conn
            .query_row(
                "SELECT project_id, raw_json, raw_json_hash, scanned_at
                 FROM project_scan WHERE project_id = ?1",
                params![project_id],
                Self::map_scan,
            )
            .optional()?;
        let derived = conn
            .query_row(
                &format!("SELECT {DERIVED_COLUMNS} FROM project_derived WHERE project_id = ?1"),
                params![project_id],
                Self::map_derived,
            )
            .optional()?;
        let enrichment = conn
            .query_row(
                &format!(
                    "SELECT {ENRICHMENT_COLUMNS} FROM project_enrichment WHERE project_id = ?1"
                ),
                params![project_id],
                Self::map_enrichment,
            )
            .optional()?;
        let github = conn
            .query_row(
                &format!("SELECT {GITHUB_COLUMNS} FROM project_github WHERE project_id = ?1"),
                params![project_id],
                Self::map_github,
            )
            .optional()?;

        Ok(Some(ProjectLayers {
            project,
            scan,
            derived,
            enrichment,
            overrides: Self::query_override(&conn, project_id)?,
            metadata: Self::query_metadata(&conn, project_id)?,
            github,
        }))
    }

    /// Layers for every non-pruned project, sorted by name.
    pub fn list_layers(&self) -> Result<Vec<ProjectLayers>> {
        let projects = self.list_projects(false)?;
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;

        // Every layer table keys on project_id in column 0.
        fn load<T>(
            conn: &Connection,
            sql: &str,
            map: fn(&rusqlite::Row) -> rusqlite::Result<T>,
        ) -> Result<HashMap<String, T>> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, map(row)?)))?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        }

        let mut scans = load(
            &conn,
            "SELECT project_id, raw_json, raw_json_hash, scanned_at FROM project_scan",
            Self::map_scan,
        )?;
        let mut derived = load(
            &conn,
            &format!("SELECT {DERIVED_COLUMNS} FROM project_derived"),
            Self::map_derived,
        )?;
        let mut enrichments = load(
            &conn,
            &format!("SELECT {ENRICHMENT_COLUMNS} FROM project_enrichment"),
            Self::map_enrichment,
        )?;
        let mut overrides = load(
            &conn,
            &format!("SELECT {OVERRIDE_COLUMNS} FROM project_override"),
            Self::map_override,
        )?;
        let mut metadata = load(
            &conn,
            &format!("SELECT {METADATA_COLUMNS} FROM project_metadata"),
            Self::map_metadata,
        )?;
        let mut github = load(
            &conn,
            &format!("SELECT {GITHUB_COLUMNS} FROM project_github"),
            Self::map_github,
        )?;

        Ok(projects
            .into_iter()
            .map(|project| {
                let id = project.id.clone();
                ProjectLayers {
                    scan: scans.remove(&id),
                    derived: derived.remove(&id),
                    enrichment: enrichments.remove(&id),
                    overrides: overrides.remove(&id),
                    metadata: metadata.remove(&id),
                    github: github.remove(&id),
                    project,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreBreakdown;
    use serde_json::json;

    fn db_with(ids: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for id in ids {
            db.upsert_project(
                &UpsertProject {
                    id: id.to_string(),
                    name: format!("proj-{id}"),
                    path_display: format!("~/dev/proj-{id}"),
                    last_touched_at: Some(1_000),
                },
                1_000,
            )
            .unwrap();
        }
        db
    }

    fn derived(id: &str) -> DerivedRecord {
        DerivedRecord {
            project_id: id.to_string(),
            status: ProjectStatus::Active,
            health_score: 80,
            hygiene_score: 70,
            momentum_score: 99,
            score_breakdown: ScoreBreakdown::default(),
            is_dirty: true,
            ahead: 1,
            behind: 0,
            framework: None,
            branch_name: Some("main".into()),
            last_commit_date: None,
            loc_estimate: 1234,
            tags: vec!["rust".into()],
            derived_at: 2_000,
        }
    }

    #[test]
    fn test_open_path_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/projdash.db");
        let db = Database::open_path(&path).unwrap();
        db.ping().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_upsert_project_is_idempotent() {
        let db = db_with(&["a"]);
        db.upsert_project(
            &UpsertProject {
                id: "a".into(),
                name: "renamed".into(),
                path_display: "~/dev/renamed".into(),
                last_touched_at: Some(500),
            },
            3_000,
        )
        .unwrap();

        let projects = db.list_projects(true).unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].name, "renamed");
        // An older commit date never moves last_touched_at backwards
        assert_eq!(projects[0].last_touched_at, Some(1_000));
        assert_eq!(projects[0].created_at, 1_000);
    }

    #[test]
    fn test_prune_is_reversible() {
        let db = db_with(&["a", "b"]);

        let report = db.reconcile_pruned(&["a".to_string()], 5_000).unwrap();
        assert_eq!(report, PruneReport { pruned: 1, restored: 0 });
        assert_eq!(db.get_project("b").unwrap().unwrap().pruned_at, Some(5_000));
        assert_eq!(db.list_projects(false).unwrap().len(), 1);

        let report = db
            .reconcile_pruned(&["a".to_string(), "b".to_string()], 6_000)
            .unwrap();
        assert_eq!(report, PruneReport { pruned: 0, restored: 1 });
        assert_eq!(db.get_project("b").unwrap().unwrap().pruned_at, None);
    }

    #[test]
    fn test_enrichment_error_keeps_previous_analysis() {
        let db = db_with(&["a"]);
        db.upsert_enrichment(
            &EnrichmentRecord {
                project_id: "a".into(),
                summary: Some("A CLI tool".into()),
                tags: Some(vec!["cli".into()]),
                generated_at: Some(2_000),
                ..Default::default()
            },
            2_000,
        )
        .unwrap();
        db.record_enrichment_error("a", "timed out", 3_000).unwrap();

        let layers = db.get_layers("a").unwrap().unwrap();
        let enrichment = layers.enrichment.unwrap();
        assert_eq!(enrichment.summary.as_deref(), Some("A CLI tool"));
        assert_eq!(enrichment.error.as_deref(), Some("timed out"));
        assert_eq!(enrichment.generated_at, Some(2_000));
        assert_eq!(db.previous_summary("a").unwrap().as_deref(), Some("A CLI tool"));
    }

    #[test]
    fn test_error_only_enrichment_has_no_tags() {
        let db = db_with(&["a"]);
        db.record_enrichment_error("a", "no provider", 3_000).unwrap();
        let enrichment = db.get_layers("a").unwrap().unwrap().enrichment.unwrap();
        assert_eq!(enrichment.tags, None);
        assert!(enrichment.risks.is_empty());
        assert_eq!(db.previous_summary("a").unwrap(), None);
    }

    #[test]
    fn test_override_patch_round_trip() {
        let db = db_with(&["a"]);
        let patch = OverridePatch {
            status: Some(Some(ProjectStatus::Paused)),
            tags: Some(Some(vec![])),
            ..Default::default()
        };
        db.update_override("a", &patch, 4_000).unwrap();

        let clear = OverridePatch {
            status: Some(None),
            notes: Some(Some("waiting on upstream".into())),
            ..Default::default()
        };
        let record = db.update_override("a", &clear, 5_000).unwrap();
        assert_eq!(record.status, None);
        assert_eq!(record.tags, Some(vec![]));

        let stored = db.get_layers("a").unwrap().unwrap().overrides.unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn test_fill_metadata_respects_user_values() {
        let db = db_with(&["a"]);
        db.update_metadata(
            "a",
            &MetadataPatch {
                goal: Some(Some("mine".into())),
                ..Default::default()
            },
            1_000,
        )
        .unwrap();

        let fill = MetadataFill {
            goal: Some("theirs".into()),
            next_action: Some("write docs".into()),
            ..Default::default()
        };
        assert_eq!(db.fill_metadata("a", &fill, false, 2_000).unwrap(), 1);

        let metadata = db.get_layers("a").unwrap().unwrap().metadata.unwrap();
        assert_eq!(metadata.goal.as_deref(), Some("mine"));
        assert_eq!(metadata.next_action.as_deref(), Some("write docs"));
    }

    #[test]
    fn test_activity_append_list_and_purge() {
        let db = db_with(&["a"]);
        db.append_activity("a", "scan", &json!({"n": 1}), 1_000).unwrap();
        db.append_activity("a", "opened", &json!({}), 2_000).unwrap();
        db.append_activity("a", "scan", &json!({"n": 3}), 3_000).unwrap();

        let recent = db.list_activity("a", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].payload, json!({"n": 3}));
        assert_eq!(recent[1].kind, "opened");

        assert_eq!(db.purge_activity_before(2_000).unwrap(), 1);
        assert_eq!(db.list_activity("a", 20).unwrap().len(), 2);
    }

    #[test]
    fn test_list_layers_groups_by_project() {
        let db = db_with(&["b", "a"]);
        db.upsert_derived(&derived("a")).unwrap();
        db.upsert_scan(&ScanRecord {
            project_id: "b".into(),
            raw_json: "{}".into(),
            raw_json_hash: "h".into(),
            scanned_at: 1,
        })
        .unwrap();

        let layers = db.list_layers().unwrap();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0].project.id, "a");
        assert_eq!(layers[0].derived.as_ref(), Some(&derived("a")));
        assert!(layers[0].scan.is_none());
        assert!(layers[1].scan.is_some());
        assert!(layers[1].derived.is_none());
    }

    fn scan(id: &str) -> ScanRecord {
        ScanRecord {
            project_id: id.to_string(),
            raw_json: "{}".into(),
            raw_json_hash: "h".into(),
            scanned_at: 2_000,
        }
    }

    fn project(id: &str) -> UpsertProject {
        UpsertProject {
            id: id.to_string(),
            name: format!("proj-{id}"),
            path_display: format!("~/dev/proj-{id}"),
            last_touched_at: None,
        }
    }

    #[test]
    fn test_store_scan_result_writes_all_layers() {
        let db = Database::open_in_memory().unwrap();
        db.store_scan_result(&project("a"), &scan("a"), Some(&derived("a")), 2_000)
            .unwrap();

        let layers = db.get_layers("a").unwrap().unwrap();
        assert_eq!(layers.project.name, "proj-a");
        assert_eq!(layers.scan, Some(scan("a")));
        assert_eq!(layers.derived, Some(derived("a")));
    }

    #[test]
    fn test_store_scan_result_without_scores_drops_stale_derived() {
        let db = Database::open_in_memory().unwrap();
        db.store_scan_result(&project("a"), &scan("a"), Some(&derived("a")), 2_000)
            .unwrap();
        db.store_scan_result(&project("a"), &scan("a"), None, 3_000).unwrap();

        let layers = db.get_layers("a").unwrap().unwrap();
        assert!(layers.scan.is_some());
        assert!(layers.derived.is_none());
    }

    #[test]
    fn test_store_scan_result_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        // The derived row references a project that does not exist, so the
        // foreign key fails after the project and scan writes.
        let err = db.store_scan_result(&project("a"), &scan("a"), Some(&derived("ghost")), 2_000);
        assert!(matches!(err, Err(Error::Database(_))));
        assert!(db.get_project("a").unwrap().is_none());
    }

    #[test]
    fn test_github_layer_round_trip() {
        use crate::github::{CiStatus, IssueRef, RepoVisibility};

        let db = db_with(&["a", "b"]);
        let record = GitHubRecord {
            project_id: "a".into(),
            open_issues: 3,
            open_prs: 1,
            ci_status: CiStatus::Failure,
            issues_top: vec![IssueRef {
                title: "Crash".into(),
                number: 7,
            }],
            prs_top: vec![],
            repo_visibility: RepoVisibility::Private,
            fetched_at: 5_000,
        };
        db.upsert_github(&record).unwrap();
        db.upsert_github(&GitHubRecord {
            open_issues: 4,
            ..record.clone()
        })
        .unwrap();

        let layers = db.get_layers("a").unwrap().unwrap();
        assert_eq!(layers.github.as_ref().map(|g| g.open_issues), Some(4));
        assert_eq!(layers.github.unwrap().issues_top, record.issues_top);

        let all = db.list_layers().unwrap();
        assert!(all[0].github.is_some());
        assert!(all[1].github.is_none());
    }

    #[test]
    fn test_pin_and_touch() {
        let db = db_with(&["a"]);
        assert_eq!(db.toggle_pin("a", 1).unwrap(), Some(true));
        assert_eq!(db.toggle_pin("a", 2).unwrap(), Some(false));
        assert_eq!(db.toggle_pin("missing", 3).unwrap(), None);

        assert!(db.touch_project("a", 9_000).unwrap());
        assert!(!db.touch_project("missing", 9_000).unwrap());
        assert_eq!(db.get_project("a").unwrap().unwrap().last_touched_at, Some(9_000));
    }
}
