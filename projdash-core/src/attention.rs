//! Rules that flag projects needing a look.

use serde::Serialize;

use crate::merge::MergedView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttentionReason {
    pub code: &'static str,
    pub label: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attention {
    pub needs_attention: bool,
    pub reasons: Vec<AttentionReason>,
    /// Highest severity among the reasons, `low` when there are none.
    pub severity: Severity,
}

pub const LOW_HYGIENE_BELOW: u32 = 30;
pub const STALE_MOMENTUM_BELOW: u32 = 25;
pub const HIGH_TODO_COUNT: u32 = 20;

type Rule = fn(&MergedView) -> Option<AttentionReason>;

fn reason(code: &'static str, label: impl Into<String>, severity: Severity) -> Option<AttentionReason> {
    Some(AttentionReason {
        code,
        label: label.into(),
        severity,
    })
}

fn low_hygiene(p: &MergedView) -> Option<AttentionReason> {
    if p.hygiene_score < LOW_HYGIENE_BELOW {
        return reason("LOW_HYGIENE", "Low hygiene score", Severity::High);
    }
    None
}

fn stale_momentum(p: &MergedView) -> Option<AttentionReason> {
    if p.momentum_score < STALE_MOMENTUM_BELOW {
        return reason("STALE_MOMENTUM", "Stale momentum", Severity::Medium);
    }
    None
}

fn dirty_age(p: &MergedView) -> Option<AttentionReason> {
    if p.is_dirty && p.days_inactive.unwrap_or(0) > 7 {
        return reason("DIRTY_AGE_GT_7", "Dirty working tree for >7 days", Severity::Medium);
    }
    None
}

fn no_next_action(p: &MergedView) -> Option<AttentionReason> {
    let missing = p.next_action.as_deref().is_none_or(|a| a.trim().is_empty());
    if missing && p.days_inactive.unwrap_or(0) > 30 {
        return reason(
            "NO_NEXT_ACTION_GT_30",
            "Inactive >30 days with no next action",
            Severity::High,
        );
    }
    None
}

// Fresh local commits are normal; only flag them once they have sat a week.
fn unpushed(p: &MergedView) -> Option<AttentionReason> {
    if p.ahead > 0 && p.days_inactive.unwrap_or(0) > 7 {
        return reason("UNPUSHED_CHANGES", "Unpushed commits aging >7 days", Severity::Low);
    }
    None
}

fn high_todo_count(p: &MergedView) -> Option<AttentionReason> {
    if p.todo_count >= HIGH_TODO_COUNT {
        return reason(
            "HIGH_TODO_COUNT",
            format!("{} TODOs in codebase", p.todo_count),
            Severity::Low,
        );
    }
    None
}

const RULES: [Rule; 6] = [
    low_hygiene,
    stale_momentum,
    dirty_age,
    no_next_action,
    unpushed,
    high_todo_count,
];

/// Evaluate every rule against a merged view, in a fixed order.
pub fn evaluate(project: &MergedView) -> Attention {
    let reasons: Vec<AttentionReason> = RULES.iter().filter_map(|rule| rule(project)).collect();
    let severity = reasons
        .iter()
        .map(|r| r.severity)
        .max()
        .unwrap_or(Severity::Low);
    Attention {
        needs_attention: !reasons.is_empty(),
        reasons,
        severity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ProjectLayers, ProjectRecord};
    use crate::merge::merge;

    fn healthy() -> MergedView {
        let mut view = merge(&ProjectLayers {
            project: ProjectRecord {
                id: "p1".into(),
                name: "widget".into(),
                path_display: "~/dev/widget".into(),
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
        });
        view.hygiene_score = 80;
        view.momentum_score = 70;
        view.days_inactive = Some(2);
        view.next_action = Some("Ship it".into());
        view
    }

    fn codes(a: &Attention) -> Vec<&'static str> {
        a.reasons.iter().map(|r| r.code).collect()
    }

    #[test]
    fn test_healthy_project_is_quiet() {
        let a = evaluate(&healthy());
        assert!(!a.needs_attention);
        assert!(a.reasons.is_empty());
        assert_eq!(a.severity, Severity::Low);
    }

    #[test]
    fn test_thresholds() {
        let mut p = healthy();
        p.hygiene_score = 30;
        p.momentum_score = 25;
        p.todo_count = 19;
        assert!(!evaluate(&p).needs_attention);

        p.hygiene_score = 29;
        p.momentum_score = 24;
        p.todo_count = 20;
        let a = evaluate(&p);
        assert_eq!(codes(&a), vec!["LOW_HYGIENE", "STALE_MOMENTUM", "HIGH_TODO_COUNT"]);
        assert_eq!(a.reasons[2].label, "20 TODOs in codebase");
        assert_eq!(a.severity, Severity::High);
    }

    #[test]
    fn test_age_based_rules() {
        let mut p = healthy();
        p.is_dirty = true;
        p.ahead = 3;
        p.days_inactive = Some(7);
        assert!(!evaluate(&p).needs_attention);

        p.days_inactive = Some(8);
        let a = evaluate(&p);
        assert_eq!(codes(&a), vec!["DIRTY_AGE_GT_7", "UNPUSHED_CHANGES"]);
        assert_eq!(a.severity, Severity::Medium);

        p.is_dirty = false;
        p.ahead = 0;
        p.days_inactive = Some(31);
        p.next_action = Some("   ".into());
        assert_eq!(codes(&evaluate(&p)), vec!["NO_NEXT_ACTION_GT_30"]);
    }

    #[test]
    fn test_unknown_inactivity_counts_as_zero() {
        let mut p = healthy();
        p.days_inactive = None;
        p.is_dirty = true;
        p.next_action = None;
        assert!(!evaluate(&p).needs_attention);
    }
}
