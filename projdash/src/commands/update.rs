//! `override` and `meta`: edits to the user-owned layers.
//!
//! Flags become a JSON patch body (cleared fields as `null`), which is then
//! parsed with the same patch types the HTTP API uses.

use anyhow::{Context, Result};
use colored::Colorize;
use projdash_core::db::{MetadataPatch, OverridePatch};
use projdash_core::Config;
use serde_json::{Map, Value};

use super::{now_millis, open_db, resolve_project};
use crate::cli::{MetaArgs, OverrideArgs};

const OVERRIDE_FIELDS: [&str; 4] = ["status", "purpose", "tags", "notes"];
const METADATA_FIELDS: [&str; 5] = [
    "goal",
    "audience",
    "successMetrics",
    "nextAction",
    "publishTarget",
];

/// `success-metrics` or `success_metrics` to `successMetrics`.
fn camel_field(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.trim().chars() {
        if c == '-' || c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn apply_clears(body: &mut Map<String, Value>, clear: &[String], allowed: &[&str]) -> Result<()> {
    for field in clear {
        let key = camel_field(field);
        if !allowed.contains(&key.as_str()) {
            anyhow::bail!("Unknown field '{}' (expected one of: {})", field, allowed.join(", "));
        }
        body.insert(key, Value::Null);
    }
    Ok(())
}

fn override_body(args: &OverrideArgs) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    if let Some(status) = args.status {
        body.insert("status".into(), Value::String(status.as_str().to_string()));
    }
    if let Some(purpose) = &args.purpose {
        body.insert("purpose".into(), Value::String(purpose.clone()));
    }
    if let Some(tags) = &args.tags {
        let tags: Vec<Value> = tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| Value::String(t.to_string()))
            .collect();
        body.insert("tags".into(), Value::Array(tags));
    }
    if let Some(notes) = &args.notes {
        body.insert("notes".into(), Value::String(notes.clone()));
    }
    apply_clears(&mut body, &args.clear, &OVERRIDE_FIELDS)?;
    Ok(body)
}

fn metadata_body(args: &MetaArgs) -> Result<Map<String, Value>> {
    let mut body = Map::new();
    let fields = [
        ("goal", &args.goal),
        ("audience", &args.audience),
        ("successMetrics", &args.success_metrics),
        ("nextAction", &args.next_action),
        ("publishTarget", &args.publish_target),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            body.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    apply_clears(&mut body, &args.clear, &METADATA_FIELDS)?;
    Ok(body)
}

pub async fn execute_override(args: OverrideArgs, config: &Config) -> Result<()> {
    let body = override_body(&args)?;
    if body.is_empty() {
        anyhow::bail!("Nothing to update; pass at least one field or --clear");
    }
    let payload = Value::Object(body);
    let patch: OverridePatch =
        serde_json::from_value(payload.clone()).context("Invalid override")?;

    let db = open_db(config)?;
    let view = resolve_project(&db, &args.project)?;
    let now = now_millis();
    db.update_override(&view.id, &patch, now)?;
    db.append_activity(&view.id, "override", &payload, now)?;

    println!("{} Updated overrides for {}", "✓".green(), view.name.bold());
    Ok(())
}

pub async fn execute_meta(args: MetaArgs, config: &Config) -> Result<()> {
    let body = metadata_body(&args)?;
    if body.is_empty() {
        anyhow::bail!("Nothing to update; pass at least one field or --clear");
    }
    let payload = Value::Object(body);
    let patch: MetadataPatch =
        serde_json::from_value(payload.clone()).context("Invalid metadata")?;

    let db = open_db(config)?;
    let view = resolve_project(&db, &args.project)?;
    let now = now_millis();
    db.update_metadata(&view.id, &patch, now)?;
    db.append_activity(&view.id, "metadata", &payload, now)?;

    println!("{} Updated metadata for {}", "✓".green(), view.name.bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use projdash_core::scoring::ProjectStatus;

    fn override_args(argv: &[&str]) -> OverrideArgs {
        let mut full = vec!["projdash", "override", "widget"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Override(args) => args,
            _ => panic!("expected override"),
        }
    }

    fn meta_args(argv: &[&str]) -> MetaArgs {
        let mut full = vec!["projdash", "meta", "widget"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Commands::Meta(args) => args,
            _ => panic!("expected meta"),
        }
    }

    #[test]
    fn test_camel_field() {
        assert_eq!(camel_field("success-metrics"), "successMetrics");
        assert_eq!(camel_field("next_action"), "nextAction");
        assert_eq!(camel_field("goal"), "goal");
    }

    #[test]
    fn test_override_body_parses_as_patch() {
        let body = override_body(&override_args(&["--status", "paused", "--tags", "a, b,", "--clear", "notes"]))
            .unwrap();
        let patch: OverridePatch = serde_json::from_value(Value::Object(body)).unwrap();
        assert_eq!(patch.status, Some(Some(ProjectStatus::Paused)));
        assert_eq!(patch.tags, Some(Some(vec!["a".to_string(), "b".to_string()])));
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.purpose, None);
    }

    #[test]
    fn test_metadata_clear_uses_wire_names() {
        let body = metadata_body(&meta_args(&["--goal", "Ship", "--clear", "next-action"])).unwrap();
        let patch: MetadataPatch = serde_json::from_value(Value::Object(body)).unwrap();
        assert_eq!(patch.goal, Some(Some("Ship".to_string())));
        assert_eq!(patch.next_action, Some(None));
    }

    #[test]
    fn test_unknown_clear_field_rejected() {
        assert!(metadata_body(&meta_args(&["--clear", "status"])).is_err());
        assert!(override_body(&override_args(&["--clear", "goal"])).is_err());
    }
}
