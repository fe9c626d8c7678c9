//! Database types for projdash-core.

use serde::{Deserialize, Deserializer, Serialize};

use crate::github::{CiStatus, GitHubData, IssueRef, RepoVisibility};
use crate::scan::FactRecord;
use crate::scoring::{ProjectStatus, ScoreBreakdown, Scored};

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

/// A project directory known to the inventory. `id` is the path hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub path_display: String,
    pub pinned: bool,
    pub last_touched_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub pruned_at: Option<i64>,
}

/// Scan layer: the serialized fact record for the latest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub project_id: String,
    pub raw_json: String,
    pub raw_json_hash: String,
    pub scanned_at: i64,
}

impl ScanRecord {
    /// Decode the stored facts. A corrupt payload reads as absent.
    pub fn facts(&self) -> Option<FactRecord> {
        serde_json::from_str(&self.raw_json).ok()
    }
}

/// Derived layer: scoring output plus fields promoted from the facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedRecord {
    pub project_id: String,
    pub status: ProjectStatus,
    pub health_score: u32,
    pub hygiene_score: u32,
    pub momentum_score: u32,
    pub score_breakdown: ScoreBreakdown,
    pub is_dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub framework: Option<String>,
    pub branch_name: Option<String>,
    pub last_commit_date: Option<String>,
    pub loc_estimate: u64,
    pub tags: Vec<String>,
    pub derived_at: i64,
}

impl DerivedRecord {
    pub fn from_scored(fact: &FactRecord, scored: &Scored, derived_at: i64) -> Self {
        Self {
            project_id: fact.path_hash.clone(),
            status: scored.status,
            health_score: scored.health,
            hygiene_score: scored.hygiene,
            momentum_score: scored.momentum,
            score_breakdown: scored.breakdown.clone(),
            is_dirty: fact.is_dirty,
            ahead: fact.ahead,
            behind: fact.behind,
            framework: fact.framework.clone(),
            branch_name: fact.branch_name.clone(),
            last_commit_date: fact.last_commit_date.clone(),
            loc_estimate: fact.loc_estimate,
            tags: scored.tags.clone(),
            derived_at,
        }
    }
}

/// Enrichment layer. `generated_at` is set only by a successful call; a
/// failed call records `error` and leaves the previous analysis in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentRecord {
    pub project_id: String,
    pub summary: Option<String>,
    pub next_action: Option<String>,
    pub phase: Option<String>,
    pub phase_reason: Option<String>,
    pub risks: Vec<String>,
    pub recommendations: Vec<String>,
    pub tags: Option<Vec<String>>,
    pub framework: Option<String>,
    pub primary_language: Option<String>,
    pub generated_at: Option<i64>,
    pub error: Option<String>,
}

/// GitHub layer: repository data from the last successful lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitHubRecord {
    pub project_id: String,
    pub open_issues: u32,
    pub open_prs: u32,
    pub ci_status: CiStatus,
    pub issues_top: Vec<IssueRef>,
    pub prs_top: Vec<IssueRef>,
    pub repo_visibility: RepoVisibility,
    pub fetched_at: i64,
}

impl GitHubRecord {
    pub fn from_data(project_id: &str, data: &GitHubData, fetched_at: i64) -> Self {
        Self {
            project_id: project_id.to_string(),
            open_issues: data.open_issues,
            open_prs: data.open_prs,
            ci_status: data.ci_status,
            issues_top: data.top_issues.clone(),
            prs_top: data.top_prs.clone(),
            repo_visibility: data.repo_visibility,
            fetched_at,
        }
    }
}

/// Override layer: user edits the pipeline never writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    pub project_id: String,
    pub status: Option<ProjectStatus>,
    pub purpose: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<String>,
    pub updated_at: i64,
}

/// Workflow metadata layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub project_id: String,
    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub next_action: Option<String>,
    pub publish_target: Option<String>,
    pub updated_at: i64,
}

/// Immutable activity log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: String,
    pub project_id: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
}

/// All five layers for one project, plus its GitHub data.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectLayers {
    pub project: ProjectRecord,
    pub scan: Option<ScanRecord>,
    pub derived: Option<DerivedRecord>,
    pub enrichment: Option<EnrichmentRecord>,
    pub overrides: Option<OverrideRecord>,
    pub metadata: Option<MetadataRecord>,
    pub github: Option<GitHubRecord>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types
// ─────────────────────────────────────────────────────────────────────────────

/// Project row written by the pipeline's store step.
#[derive(Debug, Clone)]
pub struct UpsertProject {
    pub id: String,
    pub name: String,
    pub path_display: String,
    pub last_touched_at: Option<i64>,
}

/// Result of reconciling stored projects with a fresh scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub pruned: usize,
    pub restored: usize,
}

/// Distinguishes "field absent" (`None`) from "field explicitly null"
/// (`Some(None)`) in JSON patch bodies.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial update of the override layer. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridePatch {
    #[serde(default, deserialize_with = "double_option")]
    pub status: Option<Option<ProjectStatus>>,
    #[serde(default, deserialize_with = "double_option")]
    pub purpose: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub tags: Option<Option<Vec<String>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

impl OverridePatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.purpose.is_none() && self.tags.is_none() && self.notes.is_none()
    }

    pub fn apply(&self, record: &mut OverrideRecord) {
        if let Some(status) = &self.status {
            record.status = *status;
        }
        if let Some(purpose) = &self.purpose {
            record.purpose = purpose.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(notes) = &self.notes {
            record.notes = notes.clone();
        }
    }
}

/// Partial update of the metadata layer. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataPatch {
    #[serde(default, deserialize_with = "double_option")]
    pub goal: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub audience: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub success_metrics: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub next_action: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub publish_target: Option<Option<String>>,
}

impl MetadataPatch {
    pub fn is_empty(&self) -> bool {
        self.goal.is_none()
            && self.audience.is_none()
            && self.success_metrics.is_none()
            && self.next_action.is_none()
            && self.publish_target.is_none()
    }

    pub fn apply(&self, record: &mut MetadataRecord) {
        let fields = [
            (&self.goal, &mut record.goal),
            (&self.audience, &mut record.audience),
            (&self.success_metrics, &mut record.success_metrics),
            (&self.next_action, &mut record.next_action),
            (&self.publish_target, &mut record.publish_target),
        ];
        for (patch, slot) in fields {
            if let Some(value) = patch {
                *slot = value.clone();
            }
        }
    }
}

/// Metadata values suggested by enrichment, written only into empty fields
/// unless overwrite is requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFill {
    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub next_action: Option<String>,
    pub publish_target: Option<String>,
}

impl MetadataFill {
    /// Merge suggestions into `record`; returns how many fields changed.
    pub fn apply(&self, record: &mut MetadataRecord, overwrite: bool) -> usize {
        let fields = [
            (&self.goal, &mut record.goal),
            (&self.audience, &mut record.audience),
            (&self.success_metrics, &mut record.success_metrics),
            (&self.next_action, &mut record.next_action),
            (&self.publish_target, &mut record.publish_target),
        ];
        let mut changed = 0;
        for (suggested, slot) in fields {
            let Some(value) = suggested.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let empty = slot.as_deref().map(str::trim).is_none_or(str::is_empty);
            if (empty || overwrite) && slot.as_deref() != Some(value) {
                *slot = Some(value.to_string());
                changed += 1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_patch_distinguishes_null_from_absent() {
        let patch: OverridePatch =
            serde_json::from_str(r#"{"status":"paused","notes":null}"#).unwrap();
        assert_eq!(patch.status, Some(Some(ProjectStatus::Paused)));
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.purpose, None);

        let mut record = OverrideRecord {
            notes: Some("old".into()),
            purpose: Some("keep".into()),
            ..Default::default()
        };
        patch.apply(&mut record);
        assert_eq!(record.status, Some(ProjectStatus::Paused));
        assert_eq!(record.notes, None);
        assert_eq!(record.purpose.as_deref(), Some("keep"));
    }

    #[test]
    fn test_empty_patch() {
        let patch: MetadataPatch = serde_json::from_str("{}").unwrap();
        assert!(patch.is_empty());
        let patch: MetadataPatch = serde_json::from_str(r#"{"goal":null}"#).unwrap();
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_fill_only_touches_empty_fields() {
        let mut record = MetadataRecord {
            goal: Some("user goal".into()),
            audience: Some("  ".into()),
            ..Default::default()
        };
        let fill = MetadataFill {
            goal: Some("llm goal".into()),
            audience: Some("devs".into()),
            next_action: Some("ship it".into()),
            publish_target: Some("".into()),
            ..Default::default()
        };

        assert_eq!(fill.apply(&mut record, false), 2);
        assert_eq!(record.goal.as_deref(), Some("user goal"));
        assert_eq!(record.audience.as_deref(), Some("devs"));
        assert_eq!(record.next_action.as_deref(), Some("ship it"));
        assert_eq!(record.publish_target, None);

        assert_eq!(fill.apply(&mut record, true), 1);
        assert_eq!(record.goal.as_deref(), Some("llm goal"));
    }
}
