//! Before/after comparison around a refresh.
//!
//! Take a [`snapshot`] of the merged views before a run, then call
//! [`compute_deltas`] with the views afterwards.

use serde::Serialize;
use std::collections::HashMap;

use crate::merge::MergedView;
use crate::scoring::ProjectStatus;

/// The fields of a merged view that deltas compare.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub health: u32,
    pub hygiene: u32,
    pub momentum: u32,
    pub loc: u64,
    pub status: ProjectStatus,
    pub dirty: bool,
    pub ahead: u32,
    pub enriched_at: Option<i64>,
    pub next_action: Option<String>,
    pub summary: Option<String>,
    pub days_inactive: Option<i64>,
}

impl Snapshot {
    pub fn from_view(view: &MergedView) -> Self {
        Self {
            health: view.health_score,
            hygiene: view.hygiene_score,
            momentum: view.momentum_score,
            loc: view.loc_estimate,
            status: view.status,
            dirty: view.is_dirty,
            ahead: view.ahead,
            enriched_at: view.enriched_at,
            next_action: view.next_action.clone(),
            summary: view.summary.clone(),
            days_inactive: view.days_inactive,
        }
    }

    /// Low health, idle without a plan, or uncommitted work left sitting.
    pub fn needs_attention(&self) -> bool {
        let days = self.days_inactive.unwrap_or(0);
        let no_next_action = self.next_action.as_deref().is_none_or(|a| a.trim().is_empty());
        self.health < 40 || (days > 30 && no_next_action) || (self.dirty && days > 7)
    }
}

/// Snapshot every view, keyed by project id.
pub fn snapshot(views: &[MergedView]) -> HashMap<String, Snapshot> {
    views
        .iter()
        .map(|v| (v.id.clone(), Snapshot::from_view(v)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    HealthUp,
    HealthDown,
    HygieneUp,
    HygieneDown,
    MomentumUp,
    MomentumDown,
    StatusChanged,
    ScanChanged,
    NewlyEnriched,
    Unchanged,
}

impl Cause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HealthUp => "health_up",
            Self::HealthDown => "health_down",
            Self::HygieneUp => "hygiene_up",
            Self::HygieneDown => "hygiene_down",
            Self::MomentumUp => "momentum_up",
            Self::MomentumDown => "momentum_down",
            Self::StatusChanged => "status_changed",
            Self::ScanChanged => "scan_changed",
            Self::NewlyEnriched => "newly_enriched",
            Self::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for Cause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change of one project across the refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDelta {
    pub id: String,
    pub name: String,
    pub health: i64,
    pub hygiene: i64,
    pub momentum: i64,
    pub loc: i64,
    pub status_changed: bool,
    pub newly_enriched: bool,
    /// Whether the project did not exist in the snapshot.
    pub is_new: bool,
    pub causes: Vec<Cause>,
    /// Wire names of the compared fields whose value moved, in
    /// [`fields_changed`] order.
    pub fields_changed: Vec<&'static str>,
    /// Newly enriched with a different summary or next action.
    pub semantic_changed: bool,
}

impl ProjectDelta {
    pub fn is_unchanged(&self) -> bool {
        self.causes == [Cause::Unchanged]
    }
}

/// Dashboard-level counts for one side of the comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    pub total: usize,
    pub dirty: usize,
    pub unpushed: usize,
    pub needs_attention: usize,
    /// Rounded mean health, 0 for an empty set.
    pub avg_health: u32,
}

impl Aggregates {
    pub fn of<'a>(snapshots: impl IntoIterator<Item = &'a Snapshot>) -> Self {
        let mut agg = Self::default();
        let mut health_sum: u64 = 0;
        for s in snapshots {
            agg.total += 1;
            agg.dirty += usize::from(s.dirty);
            agg.unpushed += usize::from(s.ahead > 0);
            agg.needs_attention += usize::from(s.needs_attention());
            health_sum += u64::from(s.health);
        }
        if agg.total > 0 {
            agg.avg_health = (health_sum as f64 / agg.total as f64).round() as u32;
        }
        agg
    }
}

/// Current minus snapshot aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateDelta {
    pub total: i64,
    pub dirty: i64,
    pub unpushed: i64,
    pub needs_attention: i64,
    pub avg_health: i64,
}

impl AggregateDelta {
    pub fn between(before: &Aggregates, after: &Aggregates) -> Self {
        let diff = |a: usize, b: usize| a as i64 - b as i64;
        Self {
            total: diff(after.total, before.total),
            dirty: diff(after.dirty, before.dirty),
            unpushed: diff(after.unpushed, before.unpushed),
            needs_attention: diff(after.needs_attention, before.needs_attention),
            avg_health: i64::from(after.avg_health) - i64::from(before.avg_health),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// How many projects fell into each bucket. Each project counts once:
/// unchanged, else newly enriched, else scores/scan changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CauseSummary {
    pub scores_changed: usize,
    pub enriched: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshDeltas {
    pub projects: Vec<ProjectDelta>,
    pub before: Aggregates,
    pub after: Aggregates,
    pub aggregate: AggregateDelta,
    pub cause_summary: CauseSummary,
}

impl RefreshDeltas {
    pub fn get(&self, id: &str) -> Option<&ProjectDelta> {
        self.projects.iter().find(|d| d.id == id)
    }

    /// Projects with at least one cause other than `unchanged`.
    pub fn changed(&self) -> impl Iterator<Item = &ProjectDelta> {
        self.projects.iter().filter(|d| !d.is_unchanged())
    }
}

fn diff_dir(cur: u32, old: u32, up: Cause, down: Cause, causes: &mut Vec<Cause>) {
    match cur.cmp(&old) {
        std::cmp::Ordering::Greater => causes.push(up),
        std::cmp::Ordering::Less => causes.push(down),
        std::cmp::Ordering::Equal => {}
    }
}

/// Causes for one project in fixed vocabulary order; `unchanged` only alone.
pub fn causes(old: &Snapshot, cur: &Snapshot) -> Vec<Cause> {
    let mut causes = Vec::new();
    diff_dir(cur.health, old.health, Cause::HealthUp, Cause::HealthDown, &mut causes);
    diff_dir(cur.hygiene, old.hygiene, Cause::HygieneUp, Cause::HygieneDown, &mut causes);
    diff_dir(cur.momentum, old.momentum, Cause::MomentumUp, Cause::MomentumDown, &mut causes);
    if cur.status != old.status {
        causes.push(Cause::StatusChanged);
    }
    if cur.dirty != old.dirty
        || cur.ahead != old.ahead
        || cur.loc != old.loc
        || cur.days_inactive.unwrap_or(0) != old.days_inactive.unwrap_or(0)
    {
        causes.push(Cause::ScanChanged);
    }
    if newly_enriched(old, cur) {
        causes.push(Cause::NewlyEnriched);
    }
    if causes.is_empty() {
        causes.push(Cause::Unchanged);
    }
    causes
}

fn newly_enriched(old: &Snapshot, cur: &Snapshot) -> bool {
    cur.enriched_at.is_some() && cur.enriched_at != old.enriched_at
}

/// Fields that differ, named as in the merged view's JSON.
pub fn fields_changed(old: &Snapshot, cur: &Snapshot) -> Vec<&'static str> {
    [
        ("healthScore", cur.health != old.health),
        ("hygieneScore", cur.hygiene != old.hygiene),
        ("momentumScore", cur.momentum != old.momentum),
        ("status", cur.status != old.status),
        ("isDirty", cur.dirty != old.dirty),
        ("ahead", cur.ahead != old.ahead),
        ("locEstimate", cur.loc != old.loc),
    ]
    .into_iter()
    .filter_map(|(name, changed)| changed.then_some(name))
    .collect()
}

/// A fresh enrichment that actually rewrote the summary or next action.
pub fn semantic_changed(old: &Snapshot, cur: &Snapshot) -> bool {
    newly_enriched(old, cur) && (cur.summary != old.summary || cur.next_action != old.next_action)
}

/// Compare `before` snapshots with the `current` views.
///
/// Projects only present in `before` (pruned during the run) contribute to
/// the aggregates but get no per-project delta.
pub fn compute_deltas(before: &HashMap<String, Snapshot>, current: &[MergedView]) -> RefreshDeltas {
    let current_snaps: Vec<Snapshot> = current.iter().map(Snapshot::from_view).collect();
    let before_agg = Aggregates::of(before.values());
    let after_agg = Aggregates::of(&current_snaps);

    let mut summary = CauseSummary::default();
    let mut projects = Vec::with_capacity(current.len());

    for (view, cur) in current.iter().zip(&current_snaps) {
        let delta = match before.get(&view.id) {
            None => ProjectDelta {
                id: view.id.clone(),
                name: view.name.clone(),
                health: 0,
                hygiene: 0,
                momentum: 0,
                loc: 0,
                status_changed: false,
                newly_enriched: false,
                is_new: true,
                causes: vec![Cause::ScanChanged],
                fields_changed: Vec::new(),
                semantic_changed: false,
            },
            Some(old) => ProjectDelta {
                id: view.id.clone(),
                name: view.name.clone(),
                health: i64::from(cur.health) - i64::from(old.health),
                hygiene: i64::from(cur.hygiene) - i64::from(old.hygiene),
                momentum: i64::from(cur.momentum) - i64::from(old.momentum),
                loc: cur.loc as i64 - old.loc as i64,
                status_changed: cur.status != old.status,
                newly_enriched: newly_enriched(old, cur),
                is_new: false,
                causes: causes(old, cur),
                fields_changed: fields_changed(old, cur),
                semantic_changed: semantic_changed(old, cur),
            },
        };

        if delta.is_unchanged() {
            summary.unchanged += 1;
        } else if delta.newly_enriched {
            summary.enriched += 1;
        } else {
            summary.scores_changed += 1;
        }
        projects.push(delta);
    }

    RefreshDeltas {
        projects,
        aggregate: AggregateDelta::between(&before_agg, &after_agg),
        before: before_agg,
        after: after_agg,
        cause_summary: summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ProjectLayers, ProjectRecord};
    use crate::merge::merge;

    fn snap() -> Snapshot {
        Snapshot {
            health: 70,
            hygiene: 60,
            momentum: 50,
            loc: 5000,
            status: ProjectStatus::Active,
            dirty: false,
            ahead: 0,
            enriched_at: None,
            next_action: None,
            summary: None,
            days_inactive: Some(0),
        }
    }

    fn view(id: &str) -> MergedView {
        merge(&ProjectLayers {
            project: ProjectRecord {
                id: id.to_string(),
                name: id.to_string(),
                path_display: format!("/dev/{}", id),
                pinned: false,
                last_touched_at: None,
                created_at: 0,
                updated_at: 0,
                pruned_at: None,
            },
            scan: None,
            derived: None,
            enrichment: None,
            overrides: None,
            metadata: None,
            github: None,
        })
    }

    #[test]
    fn test_score_directions() {
        let old = snap();
        let cur = Snapshot {
            health: 75,
            hygiene: 55,
            momentum: 50,
            ..snap()
        };
        assert_eq!(causes(&old, &cur), vec![Cause::HealthUp, Cause::HygieneDown]);

        let cur = Snapshot {
            momentum: 20,
            status: ProjectStatus::Paused,
            ..snap()
        };
        assert_eq!(causes(&old, &cur), vec![Cause::MomentumDown, Cause::StatusChanged]);
    }

    #[test]
    fn test_scan_changed_triggers() {
        let old = snap();
        for cur in [
            Snapshot { dirty: true, ..snap() },
            Snapshot { ahead: 2, ..snap() },
            Snapshot { loc: 6000, ..snap() },
            Snapshot { days_inactive: Some(4), ..snap() },
        ] {
            assert_eq!(causes(&old, &cur), vec![Cause::ScanChanged]);
        }
    }

    #[test]
    fn test_unchanged_is_exclusive() {
        assert_eq!(causes(&snap(), &snap()), vec![Cause::Unchanged]);
        // Summary text changes alone are not a cause.
        let cur = Snapshot {
            summary: Some("new words".into()),
            ..snap()
        };
        assert_eq!(causes(&snap(), &cur), vec![Cause::Unchanged]);
    }

    #[test]
    fn test_newly_enriched() {
        let old = Snapshot {
            enriched_at: Some(100),
            ..snap()
        };
        let cur = Snapshot {
            enriched_at: Some(200),
            ..snap()
        };
        assert_eq!(causes(&old, &cur), vec![Cause::NewlyEnriched]);
        // Losing the timestamp is not an enrichment.
        assert_eq!(causes(&cur, &snap()), vec![Cause::Unchanged]);
    }

    #[test]
    fn test_needs_attention_rules() {
        assert!(Snapshot { health: 39, ..snap() }.needs_attention());
        assert!(!Snapshot { health: 40, ..snap() }.needs_attention());
        assert!(Snapshot {
            days_inactive: Some(31),
            ..snap()
        }
        .needs_attention());
        assert!(!Snapshot {
            days_inactive: Some(31),
            next_action: Some("ship".into()),
            ..snap()
        }
        .needs_attention());
        assert!(Snapshot {
            dirty: true,
            days_inactive: Some(8),
            ..snap()
        }
        .needs_attention());
        assert!(!Snapshot {
            dirty: true,
            days_inactive: Some(7),
            ..snap()
        }
        .needs_attention());
    }

    #[test]
    fn test_aggregates_round_mean_health() {
        let snaps = [
            Snapshot { health: 50, dirty: true, ..snap() },
            Snapshot { health: 51, ahead: 1, ..snap() },
        ];
        let agg = Aggregates::of(&snaps);
        assert_eq!(agg.total, 2);
        assert_eq!(agg.dirty, 1);
        assert_eq!(agg.unpushed, 1);
        assert_eq!(agg.avg_health, 51);
        assert_eq!(Aggregates::of(&Vec::<Snapshot>::new()).avg_health, 0);
    }

    #[test]
    fn test_compute_deltas_new_and_unchanged() {
        let current = vec![view("a"), view("b")];
        let mut before = snapshot(&current[..1]);
        before.insert("gone".into(), Snapshot { dirty: true, ..snap() });

        let deltas = compute_deltas(&before, &current);
        let a = deltas.get("a").unwrap();
        assert!(a.is_unchanged());
        let b = deltas.get("b").unwrap();
        assert!(b.is_new);
        assert_eq!(b.causes, vec![Cause::ScanChanged]);

        assert_eq!(deltas.cause_summary.unchanged, 1);
        assert_eq!(deltas.cause_summary.scores_changed, 1);
        assert_eq!(deltas.changed().count(), 1);

        assert_eq!(deltas.before.total, 2);
        assert_eq!(deltas.after.total, 2);
        assert_eq!(deltas.aggregate.total, 0);
        assert_eq!(deltas.aggregate.dirty, -1);
    }

    #[test]
    fn test_compute_deltas_numeric_differences() {
        let mut cur = view("a");
        cur.health_score = 80;
        cur.loc_estimate = 1200;
        cur.enriched_at = Some(5);
        let mut old = Snapshot::from_view(&view("a"));
        old.health = 60;
        old.loc = 1000;
        let before = HashMap::from([("a".to_string(), old)]);

        let deltas = compute_deltas(&before, &[cur]);
        let a = deltas.get("a").unwrap();
        assert_eq!(a.health, 20);
        assert_eq!(a.loc, 200);
        assert!(a.newly_enriched);
        assert_eq!(
            a.causes,
            vec![Cause::HealthUp, Cause::ScanChanged, Cause::NewlyEnriched]
        );
        assert_eq!(deltas.cause_summary.enriched, 1);
        assert_eq!(deltas.aggregate.avg_health, 20);
    }

    #[test]
    fn test_fields_changed_order() {
        assert!(fields_changed(&snap(), &snap()).is_empty());
        let cur = Snapshot {
            loc: 1,
            dirty: true,
            health: 10,
            status: ProjectStatus::Paused,
            ..snap()
        };
        assert_eq!(
            fields_changed(&snap(), &cur),
            ["healthScore", "status", "isDirty", "locEstimate"]
        );
    }

    #[test]
    fn test_semantic_change_needs_new_enrichment() {
        let old = Snapshot {
            enriched_at: Some(100),
            summary: Some("old".into()),
            ..snap()
        };
        // Same text re-enriched.
        let cur = Snapshot {
            enriched_at: Some(200),
            ..old.clone()
        };
        assert!(!semantic_changed(&old, &cur));

        let cur = Snapshot {
            enriched_at: Some(200),
            next_action: Some("write docs".into()),
            ..old.clone()
        };
        assert!(semantic_changed(&old, &cur));

        // Text moved without a fresh enrichment.
        let cur = Snapshot {
            summary: Some("edited".into()),
            ..old.clone()
        };
        assert!(!semantic_changed(&old, &cur));
    }

    #[test]
    fn test_new_project_has_no_field_changes() {
        let deltas = compute_deltas(&HashMap::new(), &[view("a")]);
        let a = deltas.get("a").unwrap();
        assert!(a.fields_changed.is_empty());
        assert!(!a.semantic_changed);

        let json = serde_json::to_value(a).unwrap();
        assert_eq!(json["fieldsChanged"], serde_json::json!([]));
        assert_eq!(json["semanticChanged"], false);
    }

    #[test]
    fn test_cause_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Cause::HealthUp).unwrap(), "health_up");
        assert_eq!(Cause::NewlyEnriched.to_string(), "newly_enriched");
    }
}
