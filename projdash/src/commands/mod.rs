//! Command implementations for the projdash CLI.
//!
//! Each submodule implements the logic for one command.

pub mod activity;
pub mod doctor;
pub mod export;
pub mod list;
pub mod pin;
pub mod refresh;
pub mod show;
pub mod update;

use anyhow::{Context, Result};
use colored::{ColoredString, Colorize};
use projdash_core::scoring::ProjectStatus;
use projdash_core::{Config, Database, MergedView};

pub(crate) fn open_db(config: &Config) -> Result<Database> {
    let path = config.database_path();
    Database::open_path(&path).with_context(|| format!("Failed to open database at {:?}", path))
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Find a project by exact id, then by case-insensitive name.
pub(crate) fn resolve_project(db: &Database, key: &str) -> Result<MergedView> {
    if let Some(view) = db.merged_view(key)? {
        return Ok(view);
    }
    let matches: Vec<MergedView> = db
        .merged_views()?
        .into_iter()
        .filter(|v| v.name.eq_ignore_ascii_case(key))
        .collect();
    match matches.len() {
        0 => anyhow::bail!("No project matches '{}'", key),
        1 => Ok(matches.into_iter().next().context("match vanished")?),
        n => anyhow::bail!("'{}' matches {} projects; use the id instead", key, n),
    }
}

pub(crate) fn status_colored(status: ProjectStatus) -> ColoredString {
    let text = status.as_str();
    match status {
        ProjectStatus::Active => text.green(),
        ProjectStatus::Completed => text.blue(),
        ProjectStatus::Paused => text.yellow(),
        ProjectStatus::Archived => text.dimmed(),
    }
}

pub(crate) fn score_colored(score: u32) -> ColoredString {
    let text = score.to_string();
    match score {
        70.. => text.green(),
        40..=69 => text.yellow(),
        _ => text.red(),
    }
}

/// `+3`, `-2`, or `0`.
pub(crate) fn signed(delta: i64) -> ColoredString {
    match delta {
        d if d > 0 => format!("+{}", d).green(),
        d if d < 0 => d.to_string().red(),
        _ => "0".normal(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projdash_core::db::UpsertProject;

    fn db_with(names: &[(&str, &str)]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, name) in names {
            db.upsert_project(
                &UpsertProject {
                    id: id.to_string(),
                    name: name.to_string(),
                    path_display: format!("~/dev/{}", name),
                    last_touched_at: None,
                },
                1,
            )
            .unwrap();
        }
        db
    }

    #[test]
    fn test_resolve_by_id_or_name() {
        let db = db_with(&[("a1", "Widget"), ("b2", "gadget")]);
        assert_eq!(resolve_project(&db, "b2").unwrap().name, "gadget");
        assert_eq!(resolve_project(&db, "widget").unwrap().id, "a1");
        assert!(resolve_project(&db, "nothing").is_err());
    }

    #[test]
    fn test_ambiguous_name() {
        let db = db_with(&[("a1", "dup"), ("b2", "DUP")]);
        let err = resolve_project(&db, "dup").unwrap_err();
        assert!(err.to_string().contains("matches 2 projects"));
    }
}
