//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use projdash_core::scoring::ProjectStatus;
use std::path::PathBuf;

/// Local project inventory
///
/// Scans a dev root, scores every project and keeps user annotations
/// alongside optional LLM analysis.
#[derive(Parser, Debug)]
#[command(name = "projdash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan, score and (optionally) enrich every project
    Refresh(RefreshArgs),

    /// List projects
    List(ListArgs),

    /// Show one project in detail
    Show {
        /// Project id or name
        project: String,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Set or clear user overrides (status, purpose, tags, notes)
    Override(OverrideArgs),

    /// Set or clear project metadata (goal, audience, ...)
    Meta(MetaArgs),

    /// Toggle the pinned flag
    Pin {
        /// Project id or name
        project: String,
    },

    /// Show recent activity for a project
    Activity {
        /// Project id or name
        project: String,
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Export the inventory as Markdown
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Store scan results and scores only; skip LLM enrichment
    #[arg(long)]
    pub scan_only: bool,

    /// Print the summary and deltas as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Include framework, language, branch and git columns
    #[arg(long)]
    pub all_fields: bool,

    /// Only projects with attention reasons
    #[arg(short, long)]
    pub attention: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct OverrideArgs {
    /// Project id or name
    pub project: String,

    /// Status override (active, completed, paused, archived)
    #[arg(long, value_parser = parse_status)]
    pub status: Option<ProjectStatus>,

    #[arg(long)]
    pub purpose: Option<String>,

    /// Comma-separated tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Option<Vec<String>>,

    #[arg(long)]
    pub notes: Option<String>,

    /// Clear a field (repeatable): status, purpose, tags, notes
    #[arg(long, value_name = "FIELD")]
    pub clear: Vec<String>,
}

#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Project id or name
    pub project: String,

    #[arg(long)]
    pub goal: Option<String>,

    #[arg(long)]
    pub audience: Option<String>,

    #[arg(long)]
    pub success_metrics: Option<String>,

    #[arg(long)]
    pub next_action: Option<String>,

    #[arg(long)]
    pub publish_target: Option<String>,

    /// Clear a field (repeatable): goal, audience, success-metrics,
    /// next-action, publish-target
    #[arg(long, value_name = "FIELD")]
    pub clear: Vec<String>,
}

fn parse_status(s: &str) -> Result<ProjectStatus, String> {
    ProjectStatus::ALL
        .into_iter()
        .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| {
            let valid: Vec<&str> = ProjectStatus::ALL.iter().map(|s| s.as_str()).collect();
            format!("invalid status '{}', expected one of: {}", s, valid.join(", "))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_override_args() {
        let cli = Cli::parse_from([
            "projdash", "override", "widget", "--status", "Paused", "--tags", "rust,cli", "--clear",
            "notes",
        ]);
        let Commands::Override(args) = cli.command else {
            panic!("expected override");
        };
        assert_eq!(args.status, Some(ProjectStatus::Paused));
        assert_eq!(args.tags, Some(vec!["rust".to_string(), "cli".to_string()]));
        assert_eq!(args.clear, vec!["notes"]);
    }

    #[test]
    fn test_invalid_status_rejected() {
        let result = Cli::try_parse_from(["projdash", "override", "w", "--status", "done"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_refresh_flags() {
        let cli = Cli::parse_from(["projdash", "refresh", "--scan-only", "--json"]);
        let Commands::Refresh(args) = cli.command else {
            panic!("expected refresh");
        };
        assert!(args.scan_only);
        assert!(args.json);
    }
}
