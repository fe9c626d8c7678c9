//! Single-project detail view.

use anyhow::Result;
use colored::Colorize;
use projdash_core::attention;
use projdash_core::github::CiStatus;
use projdash_core::merge::EnrichmentStatus;
use projdash_core::{Config, MergedView};

use super::{open_db, resolve_project, score_colored, status_colored};

pub async fn execute(project: &str, json: bool, config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let view = resolve_project(&db, project)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_view(&view);
    }
    Ok(())
}

fn field(label: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        println!("    {:<16} {}", format!("{}:", label), value);
    }
}

fn print_view(v: &MergedView) {
    println!();
    let pin = if v.pinned { " (pinned)".yellow().to_string() } else { String::new() };
    println!("  {}{}", v.name.cyan().bold(), pin);
    println!("  {}", v.path_display.dimmed());
    println!("  id {}", v.id.dimmed());
    println!();

    let source = v
        .status_source
        .map(|s| format!(" (from {})", s.as_str()))
        .unwrap_or_default();
    println!("    {:<16} {}{}", "Status:", status_colored(v.status), source.dimmed());
    println!(
        "    {:<16} {}  (hygiene {}, momentum {})",
        "Health:",
        score_colored(v.health_score),
        v.hygiene_score,
        v.momentum_score
    );
    if let Some(days) = v.days_inactive {
        println!("    {:<16} {}", "Days inactive:", days);
    }
    field("Phase", v.phase.as_deref());
    field("Next action", v.next_action.as_deref());
    if !v.tags.is_empty() {
        println!("    {:<16} {}", "Tags:", v.tags.join(", "));
    }

    if let Some(summary) = v.summary.as_deref() {
        println!();
        println!("  {}", "Summary:".cyan().bold());
        println!("    {}", summary);
    }

    println!();
    println!("  {}", "Metadata:".cyan().bold());
    field("Goal", v.goal.as_deref());
    field("Audience", v.audience.as_deref());
    field("Success metrics", v.success_metrics.as_deref());
    field("Publish target", v.publish_target.as_deref());
    field("Notes", v.notes.as_deref());

    println!();
    println!("  {}", "Repository:".cyan().bold());
    field("Branch", v.branch_name.as_deref());
    field("Framework", v.framework.as_deref());
    field("Language", v.primary_language.as_deref());
    field("Package manager", v.package_manager.as_deref());
    println!(
        "    {:<16} {} (ahead {}, behind {})",
        "Working tree:",
        if v.is_dirty { "dirty".yellow() } else { "clean".green() },
        v.ahead,
        v.behind
    );
    println!("    {:<16} ~{} lines, {} TODOs", "Size:", v.loc_estimate, v.todo_count);
    for commit in v.recent_commits.iter().take(5) {
        let short: String = commit.hash.chars().take(7).collect();
        println!("      {} {} {}", short.dimmed(), commit.date.dimmed(), commit.message);
    }

    if v.github_fetched_at.is_some() {
        println!();
        println!("  {}", "GitHub:".cyan().bold());
        println!(
            "    {:<16} {} issues, {} PRs ({})",
            "Open:",
            v.open_issues,
            v.open_prs,
            v.repo_visibility
        );
        let ci = match v.ci_status {
            CiStatus::Success => "success".green(),
            CiStatus::Failure => "failure".red(),
            CiStatus::Pending => "pending".yellow(),
            CiStatus::None => "none".dimmed(),
        };
        println!("    {:<16} {}", "CI:", ci);
        for item in v.issues_top.iter().chain(&v.prs_top) {
            println!("      {} {}", format!("#{}", item.number).dimmed(), item.title);
        }
    }

    match v.enrichment_status {
        EnrichmentStatus::Failed => {
            println!();
            println!(
                "  {} {}",
                "Last enrichment failed:".red(),
                v.enrichment_error.as_deref().unwrap_or("unknown error")
            );
        }
        EnrichmentStatus::Fresh | EnrichmentStatus::None => {}
    }
    if !v.insights.is_empty() {
        println!();
        println!("  {}", "Insights:".cyan().bold());
        for insight in &v.insights {
            println!("    • {}", insight);
        }
    }

    let result = attention::evaluate(v);
    if result.needs_attention {
        println!();
        println!("  {} ({})", "Needs attention:".red().bold(), result.severity);
        for reason in &result.reasons {
            println!("    • {} {}", reason.label, reason.code.dimmed());
        }
    }
    println!();
}
