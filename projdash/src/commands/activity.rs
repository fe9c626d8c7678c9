//! Activity log for one project.

use anyhow::Result;
use chrono::{Local, TimeZone};
use colored::Colorize;
use projdash_core::Config;
use serde_json::Value;

use super::{open_db, resolve_project};

pub async fn execute(project: &str, limit: usize, config: &Config) -> Result<()> {
    let db = open_db(config)?;
    let view = resolve_project(&db, project)?;
    let records = db.list_activity(&view.id, limit)?;

    println!();
    println!("  {} {}", "Activity:".cyan().bold(), view.name.bold());
    if records.is_empty() {
        println!("    None");
        return Ok(());
    }
    for record in &records {
        let when = Local
            .timestamp_millis_opt(record.created_at)
            .single()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| record.created_at.to_string());
        println!(
            "    {}  {:<10} {}",
            when.dimmed(),
            record.kind,
            describe(&record.payload)
        );
    }
    Ok(())
}

/// One-line rendering of an activity payload.
fn describe(payload: &Value) -> String {
    let Some(obj) = payload.as_object() else {
        return String::new();
    };
    obj.iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_describe_payload() {
        let line = describe(&json!({"status": "paused", "healthScore": 72, "notes": null}));
        assert!(line.contains("status=paused"));
        assert!(line.contains("healthScore=72"));
        assert!(line.contains("notes=null"));
        assert_eq!(describe(&json!({})), "");
        assert_eq!(describe(&json!("x")), "");
    }
}
