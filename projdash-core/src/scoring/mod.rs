//! Deterministic project scoring.
//!
//! [`score`] maps one [`FactRecord`] to a status, three 0-100 scores, the
//! per-criterion breakdown and a derived tag set. It performs no I/O and
//! reads no clock: recency comes from the fact's `days_inactive`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::scan::FactRecord;

/// Raw hygiene points available (sum of all hygiene criteria).
pub const HYGIENE_MAX: u32 = 95;
/// Raw momentum points available (sum of all momentum criteria).
pub const MOMENTUM_MAX: u32 = 70;

/// Activity classification from days since the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Completed,
    Paused,
    Archived,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 4] = [
        ProjectStatus::Active,
        ProjectStatus::Completed,
        ProjectStatus::Paused,
        ProjectStatus::Archived,
    ];

    /// Canonical boundary table: `<=14` active, `15..=60` completed,
    /// `61..=180` paused, anything older or unknown archived.
    pub fn from_days_inactive(days: Option<i64>) -> Self {
        match days {
            Some(d) if d <= 14 => Self::Active,
            Some(d) if d <= 60 => Self::Completed,
            Some(d) if d <= 180 => Self::Paused,
            _ => Self::Archived,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("invalid status '{s}'"))
    }
}

/// Points earned per criterion. Criteria that earned nothing are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub hygiene: BTreeMap<String, u32>,
    pub momentum: BTreeMap<String, u32>,
}

/// Output of the scoring engine for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scored {
    pub status: ProjectStatus,
    pub health: u32,
    pub hygiene: u32,
    pub momentum: u32,
    pub breakdown: ScoreBreakdown,
    pub tags: Vec<String>,
}

/// Rescale raw points to 0-100 on the given denominator.
fn rescale(raw: u32, denominator: u32) -> u32 {
    let capped = raw.min(denominator) as f64;
    (capped * 100.0 / denominator as f64).round() as u32
}

/// Weighted blend of hygiene and momentum.
pub fn health_score(hygiene: u32, momentum: u32) -> u32 {
    (0.65 * hygiene as f64 + 0.35 * momentum as f64).round() as u32
}

fn any_true(flags: &BTreeMap<String, bool>) -> bool {
    flags.values().any(|v| *v)
}

/// Hygiene score and the points behind it.
pub fn hygiene_score(fact: &FactRecord) -> (u32, BTreeMap<String, u32>) {
    let criteria = [
        ("readme", 15, fact.files.readme),
        ("tests", 20, fact.files.tests),
        ("cicd", 15, any_true(&fact.cicd)),
        ("remote", 10, fact.remote_url.as_deref().is_some_and(|r| !r.is_empty())),
        ("lowTodos", 10, fact.todo_count < 10),
        ("deployment", 10, any_true(&fact.deployment)),
        ("linter", 5, fact.files.linter_config),
        ("license", 5, fact.files.license),
        ("lockfile", 5, fact.files.lockfile),
    ];
    tally(&criteria, HYGIENE_MAX)
}

/// Momentum score and the points behind it.
pub fn momentum_score(fact: &FactRecord) -> (u32, BTreeMap<String, u32>) {
    let recency = match fact.days_inactive {
        Some(d) if d <= 7 => 25,
        Some(d) if d <= 14 => 20,
        Some(d) if d <= 30 => 15,
        Some(d) if d <= 60 => 5,
        _ => 0,
    };
    let criteria = [
        ("recency", recency, recency > 0),
        ("cleanTree", 20, !fact.is_dirty),
        ("pushedUp", 15, fact.ahead == 0),
        ("lowBranches", 10, fact.branch_count <= 3),
    ];
    tally(&criteria, MOMENTUM_MAX)
}

fn tally(criteria: &[(&str, u32, bool)], denominator: u32) -> (u32, BTreeMap<String, u32>) {
    let breakdown: BTreeMap<String, u32> = criteria
        .iter()
        .filter(|(_, _, earned)| *earned)
        .map(|(name, points, _)| (name.to_string(), *points))
        .collect();
    let raw = breakdown.values().sum();
    (rescale(raw, denominator), breakdown)
}

/// Sorted, de-duplicated tags derived from the fact.
pub fn derive_tags(fact: &FactRecord) -> Vec<String> {
    let mut tags = BTreeSet::new();

    for lang in &fact.languages.detected {
        tags.insert(lang.to_lowercase().replace('/', "-"));
    }
    if fact.files.dockerfile || fact.files.docker_compose {
        tags.insert("docker".to_string());
    }
    if any_true(&fact.cicd) {
        tags.insert("ci-cd".to_string());
    }
    if any_true(&fact.deployment) {
        tags.insert("deployed".to_string());
    }
    if fact.files.tests {
        tags.insert("tested".to_string());
    }
    if let Some(framework) = fact.framework.as_deref().filter(|f| !f.is_empty()) {
        tags.insert(framework.to_lowercase());
    }
    for service in &fact.services {
        tags.insert(service.to_lowercase());
    }

    tags.into_iter().collect()
}

/// Score one project.
pub fn score(fact: &FactRecord) -> Scored {
    let (hygiene, hygiene_breakdown) = hygiene_score(fact);
    let (momentum, momentum_breakdown) = momentum_score(fact);

    Scored {
        status: ProjectStatus::from_days_inactive(fact.days_inactive),
        health: health_score(hygiene, momentum),
        hygiene,
        momentum,
        breakdown: ScoreBreakdown {
            hygiene: hygiene_breakdown,
            momentum: momentum_breakdown,
        },
        tags: derive_tags(fact),
    }
}
