//! Inventory listing.

use anyhow::Result;
use colored::Colorize;
use projdash_core::attention::{self, Severity};
use projdash_core::{Config, MergedView};

use super::{open_db, score_colored, status_colored};
use crate::cli::ListArgs;

pub async fn execute(args: ListArgs, config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let mut views = db.merged_views()?;
    if args.attention {
        views.retain(|v| attention::evaluate(v).needs_attention);
    }
    // Pinned first, name order otherwise.
    views.sort_by_key(|v| !v.pinned);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        println!("No projects. Run `projdash refresh` first.");
        return Ok(());
    }

    let width = views.iter().map(|v| v.name.len()).max().unwrap_or(4).clamp(4, 32);
    print!(
        "  {:<width$}  {:<9}  {:>6}  {:>7}  {:>8}  {:>5}",
        "NAME", "STATUS", "HEALTH", "HYGIENE", "MOMENTUM", "DAYS",
    );
    if args.all_fields {
        print!("  {:<12}  {:<12}  {:<16}  {:<8}", "FRAMEWORK", "LANGUAGE", "BRANCH", "GIT");
    }
    println!("  ATTENTION");

    for view in &views {
        print_row(view, width, args.all_fields);
    }
    println!();
    println!("  {} projects", views.len());
    Ok(())
}

fn print_row(view: &MergedView, width: usize, all_fields: bool) {
    let pin = if view.pinned { "*" } else { " " };
    let days = view
        .days_inactive
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    let name: String = view.name.chars().take(width).collect();
    print!(
        "{} {:<width$}  {:<9}  {:>6}  {:>7}  {:>8}  {:>5}",
        pin,
        name,
        status_colored(view.status),
        score_colored(view.health_score),
        view.hygiene_score,
        view.momentum_score,
        days,
    );

    if all_fields {
        let git = match (view.is_dirty, view.ahead) {
            (true, 0) => "dirty".to_string(),
            (true, n) => format!("dirty+{}", n),
            (false, 0) => "clean".to_string(),
            (false, n) => format!("+{}", n),
        };
        print!(
            "  {:<12}  {:<12}  {:<16}  {:<8}",
            view.framework.as_deref().unwrap_or("-"),
            view.primary_language.as_deref().unwrap_or("-"),
            view.branch_name.as_deref().unwrap_or("-"),
            git,
        );
    }

    let result = attention::evaluate(view);
    let codes: Vec<&str> = result.reasons.iter().map(|r| r.code).collect();
    let text = codes.join(",");
    let text = match result.severity {
        _ if codes.is_empty() => "".normal(),
        Severity::High => text.red(),
        Severity::Medium => text.yellow(),
        Severity::Low => text.dimmed(),
    };
    println!("  {}", text);
}
