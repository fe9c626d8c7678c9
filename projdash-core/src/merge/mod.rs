//! Five-layer merge resolver.
//!
//! [`merge`] projects the scan, derived, enrichment, override and metadata
//! layers of one project into a single [`MergedView`]. Each field has an
//! explicit priority chain of `(Layer, Option<value>)` candidates resolved by
//! [`first_present`]: the first candidate holding a value wins, so an empty
//! string or empty list set by a higher layer still beats a lower layer.
//!
//! GitHub data has a single source and is copied through, defaulting to zero
//! counts, `none` CI and `not-on-github`.
//!
//! Merging is total. Any combination of missing layers degrades to defaults.

use serde::{Deserialize, Serialize};

use crate::db::{Database, ProjectLayers};
use crate::error::Result;
use crate::github::{CiStatus, IssueRef, RepoVisibility};
use crate::scan::{Commit, FactRecord};
use crate::scoring::{ProjectStatus, ScoreBreakdown};

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Override,
    Metadata,
    Enrichment,
    Derived,
    Scan,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Override => "override",
            Self::Metadata => "metadata",
            Self::Enrichment => "enrichment",
            Self::Derived => "derived",
            Self::Scan => "scan",
        }
    }
}

/// Outcome of a priority chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<T> {
    pub value: Option<T>,
    pub source: Option<Layer>,
}

impl<T> Resolved<T> {
    /// Value, or `default` when no layer had one.
    pub fn or(self, default: T) -> T {
        self.value.unwrap_or(default)
    }
}

impl<T: Default> Resolved<T> {
    pub fn or_default(self) -> T {
        self.value.unwrap_or_default()
    }
}

/// First candidate holding a value wins.
pub fn first_present<T>(candidates: impl IntoIterator<Item = (Layer, Option<T>)>) -> Resolved<T> {
    candidates
        .into_iter()
        .find_map(|(layer, value)| {
            value.map(|v| Resolved {
                value: Some(v),
                source: Some(layer),
            })
        })
        .unwrap_or(Resolved {
            value: None,
            source: None,
        })
}

/// Coarse state of the enrichment layer for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Last call succeeded.
    Fresh,
    /// Last call failed; earlier analysis may still be shown.
    Failed,
    /// Never enriched.
    None,
}

/// The single resolved record the UI, CLI and export consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedView {
    pub id: String,
    pub name: String,
    pub path_display: String,

    pub status: ProjectStatus,
    pub status_source: Option<Layer>,
    pub health_score: u32,
    pub hygiene_score: u32,
    pub momentum_score: u32,
    pub score_breakdown: ScoreBreakdown,

    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub next_action: Option<String>,
    pub notes: Option<String>,
    pub insights: Vec<String>,
    pub phase: Option<String>,
    pub phase_reason: Option<String>,
    pub enrichment_status: EnrichmentStatus,
    pub enriched_at: Option<i64>,
    pub enrichment_error: Option<String>,

    pub is_dirty: bool,
    pub ahead: u32,
    pub behind: u32,
    pub framework: Option<String>,
    pub primary_language: Option<String>,
    pub branch_name: Option<String>,
    pub last_commit_date: Option<String>,
    pub loc_estimate: u64,
    pub todo_count: u32,
    pub days_inactive: Option<i64>,
    pub recent_commits: Vec<Commit>,
    pub scripts: Vec<String>,
    pub services: Vec<String>,
    pub package_manager: Option<String>,

    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub publish_target: Option<String>,

    pub open_issues: u32,
    pub open_prs: u32,
    pub ci_status: CiStatus,
    pub issues_top: Vec<IssueRef>,
    pub prs_top: Vec<IssueRef>,
    pub repo_visibility: RepoVisibility,
    pub github_fetched_at: Option<i64>,

    pub pinned: bool,
    pub last_touched_at: Option<i64>,
    pub last_scanned_at: Option<i64>,
    pub pruned_at: Option<i64>,
    pub updated_at: i64,
}

/// Borrowed view of the layers with the scan payload decoded once.
struct Sources<'a> {
    layers: &'a ProjectLayers,
    facts: Option<FactRecord>,
}

impl<'a> Sources<'a> {
    fn new(layers: &'a ProjectLayers) -> Self {
        Self {
            layers,
            facts: layers.scan.as_ref().and_then(|s| s.facts()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Priority Chains
// ─────────────────────────────────────────────────────────────────────────────

/// override → derived → archived
pub fn resolve_status(layers: &ProjectLayers) -> Resolved<ProjectStatus> {
    first_present([
        (Layer::Override, layers.overrides.as_ref().and_then(|o| o.status)),
        (Layer::Derived, layers.derived.as_ref().map(|d| d.status)),
    ])
}

/// override purpose → enrichment summary → scan description
pub fn resolve_summary(layers: &ProjectLayers) -> Resolved<String> {
    let description = layers
        .scan
        .as_ref()
        .and_then(|s| s.facts())
        .and_then(|f| f.description);
    first_present([
        (Layer::Override, layers.overrides.as_ref().and_then(|o| o.purpose.clone())),
        (Layer::Enrichment, layers.enrichment.as_ref().and_then(|e| e.summary.clone())),
        (Layer::Scan, description),
    ])
}

/// override → enrichment → derived → []
pub fn resolve_tags(layers: &ProjectLayers) -> Resolved<Vec<String>> {
    first_present([
        (Layer::Override, layers.overrides.as_ref().and_then(|o| o.tags.clone())),
        (Layer::Enrichment, layers.enrichment.as_ref().and_then(|e| e.tags.clone())),
        (Layer::Derived, layers.derived.as_ref().map(|d| d.tags.clone())),
    ])
}

/// metadata → enrichment
pub fn resolve_next_action(layers: &ProjectLayers) -> Resolved<String> {
    first_present([
        (Layer::Metadata, layers.metadata.as_ref().and_then(|m| m.next_action.clone())),
        (Layer::Enrichment, layers.enrichment.as_ref().and_then(|e| e.next_action.clone())),
    ])
}

/// Promoted fields: derived → raw scan.
fn promoted<T>(src: &Sources<'_>, derived: impl Fn(&crate::db::DerivedRecord) -> T, scan: impl Fn(&FactRecord) -> T) -> Resolved<T> {
    first_present([
        (Layer::Derived, src.layers.derived.as_ref().map(&derived)),
        (Layer::Scan, src.facts.as_ref().map(&scan)),
    ])
}

/// Promoted optional fields: derived → raw scan, skipping nulls in either.
fn promoted_opt(
    src: &Sources<'_>,
    derived: impl Fn(&crate::db::DerivedRecord) -> Option<String>,
    scan: impl Fn(&FactRecord) -> Option<String>,
) -> Resolved<String> {
    first_present([
        (Layer::Derived, src.layers.derived.as_ref().and_then(&derived)),
        (Layer::Scan, src.facts.as_ref().and_then(&scan)),
    ])
}

// ─────────────────────────────────────────────────────────────────────────────
// Merge
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve all layers of one project into its merged view. Never fails.
pub fn merge(layers: &ProjectLayers) -> MergedView {
    let src = Sources::new(layers);
    let project = &layers.project;
    let derived = layers.derived.as_ref();
    let enrichment = layers.enrichment.as_ref();
    let metadata = layers.metadata.as_ref();
    let github = layers.github.as_ref();
    let facts = src.facts.as_ref();

    let status = resolve_status(layers);
    let status_source = status.source;

    let enrichment_status = match enrichment {
        Some(e) if e.error.is_some() => EnrichmentStatus::Failed,
        Some(e) if e.generated_at.is_some() => EnrichmentStatus::Fresh,
        _ => EnrichmentStatus::None,
    };

    let insights = enrichment
        .map(|e| e.risks.iter().chain(&e.recommendations).cloned().collect())
        .unwrap_or_default();

    let framework = first_present([
        (Layer::Derived, derived.and_then(|d| d.framework.clone())),
        (Layer::Scan, facts.and_then(|f| f.framework.clone())),
        (Layer::Enrichment, enrichment.and_then(|e| e.framework.clone())),
    ]);
    let primary_language = first_present([
        (Layer::Enrichment, enrichment.and_then(|e| e.primary_language.clone())),
        (Layer::Scan, facts.and_then(|f| f.languages.primary.clone())),
    ]);

    MergedView {
        id: project.id.clone(),
        name: project.name.clone(),
        path_display: project.path_display.clone(),

        status: status.or(ProjectStatus::Archived),
        status_source,
        health_score: derived.map(|d| d.health_score).unwrap_or(0),
        hygiene_score: derived.map(|d| d.hygiene_score).unwrap_or(0),
        momentum_score: derived.map(|d| d.momentum_score).unwrap_or(0),
        score_breakdown: derived.map(|d| d.score_breakdown.clone()).unwrap_or_default(),

        summary: resolve_summary(layers).value,
        tags: resolve_tags(layers).or_default(),
        next_action: resolve_next_action(layers).value,
        notes: layers.overrides.as_ref().and_then(|o| o.notes.clone()),
        insights,
        phase: enrichment.and_then(|e| e.phase.clone()),
        phase_reason: enrichment.and_then(|e| e.phase_reason.clone()),
        enrichment_status,
        enriched_at: enrichment.and_then(|e| e.generated_at),
        enrichment_error: enrichment.and_then(|e| e.error.clone()),

        is_dirty: promoted(&src, |d| d.is_dirty, |f| f.is_dirty).or(false),
        ahead: promoted(&src, |d| d.ahead, |f| f.ahead).or(0),
        behind: promoted(&src, |d| d.behind, |f| f.behind).or(0),
        framework: framework.value,
        primary_language: primary_language.value,
        branch_name: promoted_opt(&src, |d| d.branch_name.clone(), |f| f.branch_name.clone()).value,
        last_commit_date: promoted_opt(
            &src,
            |d| d.last_commit_date.clone(),
            |f| f.last_commit_date.clone(),
        )
        .value,
        loc_estimate: promoted(&src, |d| d.loc_estimate, |f| f.loc_estimate).or(0),
        todo_count: facts.map(|f| f.todo_count).unwrap_or(0),
        days_inactive: facts.and_then(|f| f.days_inactive),
        recent_commits: facts.map(|f| f.recent_commits.clone()).unwrap_or_default(),
        scripts: facts.map(|f| f.scripts.clone()).unwrap_or_default(),
        services: facts.map(|f| f.services.clone()).unwrap_or_default(),
        package_manager: facts.and_then(|f| f.package_manager.clone()),

        goal: metadata.and_then(|m| m.goal.clone()),
        audience: metadata.and_then(|m| m.audience.clone()),
        success_metrics: metadata.and_then(|m| m.success_metrics.clone()),
        publish_target: metadata.and_then(|m| m.publish_target.clone()),

        open_issues: github.map(|g| g.open_issues).unwrap_or(0),
        open_prs: github.map(|g| g.open_prs).unwrap_or(0),
        ci_status: github.map(|g| g.ci_status).unwrap_or_default(),
        issues_top: github.map(|g| g.issues_top.clone()).unwrap_or_default(),
        prs_top: github.map(|g| g.prs_top.clone()).unwrap_or_default(),
        repo_visibility: github.map(|g| g.repo_visibility).unwrap_or_default(),
        github_fetched_at: github.map(|g| g.fetched_at),

        pinned: project.pinned,
        last_touched_at: project.last_touched_at,
        last_scanned_at: layers.scan.as_ref().map(|s| s.scanned_at),
        pruned_at: project.pruned_at,
        updated_at: project.updated_at,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Read Paths
// ─────────────────────────────────────────────────────────────────────────────

impl Database {
    /// Merged view for one project, or None for an unknown id.
    pub fn merged_view(&self, project_id: &str) -> Result<Option<MergedView>> {
        Ok(self.get_layers(project_id)?.as_ref().map(merge))
    }

    /// Merged views for all non-pruned projects, sorted by name.
    pub fn merged_views(&self) -> Result<Vec<MergedView>> {
        Ok(self.list_layers()?.iter().map(merge).collect())
    }
}
