//! Pin toggle.

use anyhow::{Context, Result};
use colored::Colorize;
use projdash_core::Config;

use super::{now_millis, open_db, resolve_project};

pub async fn execute(project: &str, config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let view = resolve_project(&db, project)?;
    let pinned = db
        .toggle_pin(&view.id, now_millis())?
        .context("Project disappeared while pinning")?;

    if pinned {
        println!("{} Pinned {}", "*".yellow(), view.name.bold());
    } else {
        println!("  Unpinned {}", view.name.bold());
    }
    Ok(())
}
