//! Markdown export.

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use projdash_core::export::render_markdown;
use projdash_core::Config;
use std::path::Path;

use super::open_db;

pub async fn execute(output: Option<&Path>, config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let views = db.merged_views()?;
    let markdown = render_markdown(&views, Utc::now());

    match output {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write {:?}", path))?;
            eprintln!(
                "{} Exported {} projects to {}",
                "✓".green(),
                views.len(),
                path.display()
            );
        }
        None => print!("{}", markdown),
    }
    Ok(())
}
