//! Markdown inventory export.

use chrono::{DateTime, Utc};
use std::fmt::Write;

use crate::attention;
use crate::merge::MergedView;

/// Escape characters that would break a table cell.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

fn or_dash(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => cell(v),
        _ => "-".to_string(),
    }
}

/// Render an inventory table followed by one section per project.
pub fn render_markdown(views: &[MergedView], generated_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Project inventory");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} ({} projects)",
        generated_at.format("%Y-%m-%d %H:%M UTC"),
        views.len()
    );
    let _ = writeln!(out);

    if views.is_empty() {
        let _ = writeln!(out, "_No projects found._");
        return out;
    }

    let _ = writeln!(
        out,
        "| Project | Status | Health | Hygiene | Momentum | Days inactive | Next action |"
    );
    let _ = writeln!(out, "|---|---|---:|---:|---:|---:|---|");
    for v in views {
        let days = v
            .days_inactive
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "| {}{} | {} | {} | {} | {} | {} | {} |",
            cell(&v.name),
            if v.pinned { " (pinned)" } else { "" },
            v.status,
            v.health_score,
            v.hygiene_score,
            v.momentum_score,
            days,
            or_dash(v.next_action.as_deref()),
        );
    }

    for v in views {
        let _ = writeln!(out);
        let _ = writeln!(out, "---");
        let _ = writeln!(out);
        render_project(&mut out, v);
    }
    out
}

fn render_project(out: &mut String, v: &MergedView) {
    let _ = writeln!(out, "## {}", v.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Path:** `{}`", v.path_display);
    let _ = writeln!(out, "- **Status:** {}", v.status);
    let _ = writeln!(out, "- **Health Score:** {}/100", v.health_score);

    let optional = [
        ("Phase", v.phase.as_deref()),
        ("Framework", v.framework.as_deref()),
        ("Language", v.primary_language.as_deref()),
        ("Branch", v.branch_name.as_deref()),
        ("Goal", v.goal.as_deref()),
        ("Audience", v.audience.as_deref()),
        ("Success Metrics", v.success_metrics.as_deref()),
        ("Publish Target", v.publish_target.as_deref()),
        ("Next Action", v.next_action.as_deref()),
    ];
    for (label, value) in optional {
        if let Some(value) = value.filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(out, "- **{}:** {}", label, value);
        }
    }
    if !v.tags.is_empty() {
        let _ = writeln!(out, "- **Tags:** {}", v.tags.join(", "));
    }
    if v.is_dirty || v.ahead > 0 || v.behind > 0 {
        let _ = writeln!(
            out,
            "- **Git:** {} ahead {} behind {}",
            if v.is_dirty { "dirty," } else { "clean," },
            v.ahead,
            v.behind
        );
    }

    if let Some(summary) = v.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", summary);
    }

    if !v.insights.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Insights");
        let _ = writeln!(out);
        for insight in &v.insights {
            let _ = writeln!(out, "- {}", insight);
        }
    }

    let attention = attention::evaluate(v);
    if attention.needs_attention {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Attention ({})", attention.severity);
        let _ = writeln!(out);
        for reason in &attention.reasons {
            let _ = writeln!(out, "- {} ({})", reason.label, reason.code);
        }
    }

    if let Some(notes) = v.notes.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out);
        let _ = writeln!(out, "### Notes");
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ProjectLayers, ProjectRecord};
    use crate::merge::merge;
    use chrono::TimeZone;

    fn view(name: &str) -> MergedView {
        merge(&ProjectLayers {
            project: ProjectRecord {
                id: format!("id-{}", name),
                name: name.to_string(),
                path_display: format!("~/dev/{}", name),
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

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_inventory() {
        let md = render_markdown(&[], at());
        assert!(md.contains("Generated 2026-03-01 12:00 UTC (0 projects)"));
        assert!(md.contains("_No projects found._"));
        assert!(!md.contains("| Project |"));
    }

    #[test]
    fn test_table_and_sections() {
        let mut a = view("alpha");
        a.pinned = true;
        a.next_action = Some("Cut | release".into());
        a.goal = Some("Ship v1".into());
        a.tags = vec!["rust".into(), "cli".into()];
        a.days_inactive = Some(3);
        let b = view("beta");

        let md = render_markdown(&[a, b], at());
        assert!(md.contains("(2 projects)"));
        assert!(md.contains("| alpha (pinned) |"));
        assert!(md.contains("Cut \\| release"));
        assert!(md.contains("## alpha"));
        assert!(md.contains("- **Goal:** Ship v1"));
        assert!(md.contains("- **Tags:** rust, cli"));
        assert!(md.contains("## beta"));
        // beta has no next action
        assert!(md.contains("| - |"));
    }

    #[test]
    fn test_attention_section() {
        let mut p = view("gamma");
        p.hygiene_score = 10;
        p.momentum_score = 90;
        let md = render_markdown(&[p], at());
        assert!(md.contains("### Attention (high)"));
        assert!(md.contains("Low hygiene score (LOW_HYGIENE)"));
    }
}
