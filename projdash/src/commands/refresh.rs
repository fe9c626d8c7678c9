//! In-process refresh with live progress.
//!
//! Runs the pipeline directly against the local database, folds its events
//! through the client reducer to drive a spinner, and finishes with the
//! run summary plus the deltas against a snapshot taken before the run.
//! Ctrl-C cancels cooperatively; projects already stored are kept.

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use projdash_core::client::{compute_deltas, snapshot, RefreshDeltas, RefreshState};
use projdash_core::github::GhCli;
use projdash_core::pipeline::{EventSink, PipelineConfig, PipelineEvent, RunOptions, Step};
use projdash_core::scan::FsScanner;
use projdash_core::{enrich, Config, Orchestrator, RunOutcome, RunSummary};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{open_db, signed};
use crate::cli::RefreshArgs;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshReport<'a> {
    cancelled: bool,
    summary: &'a RunSummary,
    deltas: &'a RefreshDeltas,
}

pub async fn execute(args: RefreshArgs, config: &Config) -> Result<()> {
    let db = Arc::new(open_db(config)?);
    let before = snapshot(&db.merged_views()?);

    let enricher = if args.scan_only {
        None
    } else {
        enrich::from_config(&config.llm)?
    };
    let scanner = Arc::new(FsScanner::new(
        config.scan.dev_root.clone(),
        config.scan.exclude_dirs.clone(),
    ));
    let mut orchestrator = Orchestrator::new(
        scanner,
        db.clone(),
        enricher,
        PipelineConfig::from_config(config),
    );
    if config.github.enabled {
        orchestrator = orchestrator.with_github(Arc::new(GhCli::new()));
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let (sink, rx) = EventSink::channel(config.pipeline.event_buffer);
    let options = RunOptions {
        skip_enrichment: args.scan_only,
    };
    let progress = ProgressDisplay::new(!args.json)?;
    let (result, state) = tokio::join!(
        orchestrator.run(sink, cancel, options),
        progress.follow(rx)
    );

    let outcome = result.context("Refresh failed")?;
    debug!("Final refresh phase: {}", state.phase);

    let deltas = compute_deltas(&before, &db.merged_views()?);
    let (cancelled, summary) = match &outcome {
        RunOutcome::Completed(s) => (false, s),
        RunOutcome::Cancelled(s) => (true, s),
    };

    if args.json {
        let report = RefreshReport {
            cancelled,
            summary,
            deltas: &deltas,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(cancelled, summary);
        print_deltas(&deltas);
    }
    Ok(())
}

/// Spinner fed by reducer state; silent in JSON mode.
struct ProgressDisplay {
    bar: Option<ProgressBar>,
}

impl ProgressDisplay {
    fn new(visible: bool) -> Result<Self> {
        if !visible {
            return Ok(Self { bar: None });
        }
        let bar = ProgressBar::new_spinner();
        bar.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg}")?);
        bar.enable_steady_tick(Duration::from_millis(100));
        Ok(Self { bar: Some(bar) })
    }

    async fn follow(self, mut rx: mpsc::Receiver<PipelineEvent>) -> RefreshState {
        let mut state = RefreshState::connecting();
        while let Some(event) = rx.recv().await {
            if let (Some(bar), PipelineEvent::ProjectError { name, step, error }) = (&self.bar, &event) {
                let step = match step {
                    Step::Store => "store",
                    Step::Llm => "llm",
                };
                bar.println(format!("  {} {} ({}): {}", "✗".red(), name, step, error));
            }
            state = state.apply(&event);
            if let Some(bar) = &self.bar {
                bar.set_message(state.phase.clone());
            }
        }
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
        state
    }
}

fn print_summary(cancelled: bool, summary: &RunSummary) {
    println!();
    if cancelled {
        println!(
            "{} after {}/{} projects",
            "Refresh cancelled".yellow().bold(),
            summary.completed,
            summary.project_count
        );
    } else {
        println!(
            "{} {} projects in {:.1}s",
            "Refreshed".green().bold(),
            summary.project_count,
            summary.duration_ms as f64 / 1000.0
        );
    }

    println!("  Stored:        {}", summary.completed);
    if summary.store_failed > 0 {
        println!("  Store failed:  {}", summary.store_failed.to_string().red());
    }
    println!(
        "  Enriched:      {} ({} failed, {} skipped)",
        summary.llm_succeeded, summary.llm_failed, summary.llm_skipped
    );
    if !summary.llm_failed_names.is_empty() {
        println!("    Failed: {}", summary.llm_failed_names.join(", ").red());
    }
    if summary.pruned > 0 || summary.restored > 0 {
        println!("  Pruned:        {} (restored {})", summary.pruned, summary.restored);
    }
}

fn print_deltas(deltas: &RefreshDeltas) {
    let agg = &deltas.after;
    let change = &deltas.aggregate;
    println!();
    println!("  {}", "Inventory:".cyan().bold());
    println!("    Projects:        {} ({})", agg.total, signed(change.total));
    println!("    Avg health:      {} ({})", agg.avg_health, signed(change.avg_health));
    println!(
        "    Needs attention: {} ({})",
        agg.needs_attention,
        signed(change.needs_attention)
    );
    println!("    Dirty:           {} ({})", agg.dirty, signed(change.dirty));
    println!("    Unpushed:        {} ({})", agg.unpushed, signed(change.unpushed));

    let causes = &deltas.cause_summary;
    println!();
    println!(
        "  {} {} scores changed, {} newly enriched, {} unchanged",
        "Changes:".cyan().bold(),
        causes.scores_changed,
        causes.enriched,
        causes.unchanged
    );
    for delta in deltas.changed() {
        let label: Vec<String> = delta.causes.iter().map(|c| c.to_string()).collect();
        let new = if delta.is_new { " (new)".cyan().to_string() } else { String::new() };
        let semantic = if delta.semantic_changed { " *".yellow().to_string() } else { String::new() };
        println!(
            "    {}{}{} health {} [{}] {}",
            delta.name.bold(),
            new,
            semantic,
            signed(delta.health),
            label.join(", ").dimmed(),
            delta.fields_changed.join(" ").dimmed()
        );
    }
}
