//! Prompt construction and tolerant response parsing shared by all backends.

use regex::Regex;
use serde_json::{Map, Value};

use super::{EnrichError, Enrichment, EnrichmentInput};

pub const DEFAULT_NEXT_ACTION: &str = "Review project and decide next step";
pub const DEFAULT_PHASE: &str = "idea";
pub const PHASES: [&str; 6] = ["building", "shipping", "maintaining", "blocked", "stale", "idea"];

pub const SYSTEM_PROMPT: &str = r#"You are a developer project analyst. Given a project's scan data, derived metrics, and optional GitHub data, produce a JSON object with these exact fields:

- "summary": A 1-2 sentence description of what this project does and its current state.
- "nextAction": The single most important thing the developer should do next. Always provide a concrete, actionable step.
- "status": One of "building", "shipping", "maintaining", "blocked", "stale", or "idea".
  - "building": actively being developed, frequent commits, features in progress
  - "shipping": ready or nearly ready for release/deployment
  - "maintaining": stable, only bug fixes or minor updates
  - "blocked": unresolved problems are stopping progress
  - "stale": no recent activity, needs attention or an archiving decision
  - "idea": early stage, minimal code, exploration phase
- "statusReason": A short explanation of why you chose this status.
- "tags": An array of 3-8 descriptive tags (technology, domain, type).
- "risks": An array of 0-3 concrete risks.
- "insights": An array of 3-5 distinct observations, each stating a concern and the suggested action in one sentence.
- "framework": The primary framework (e.g. "Next.js", "FastAPI", "Axum"), or null.
- "primaryLanguage": The dominant programming language, or null.
- "goal", "audience", "successMetrics", "publishTarget": short guesses, or null when unclear.

Respond ONLY with valid JSON, no markdown fences or commentary."#;

/// User prompt for one project.
pub fn build_prompt(input: &EnrichmentInput) -> String {
    let scored = &input.scored;
    let tags = if scored.tags.is_empty() {
        "none".to_string()
    } else {
        scored.tags.join(", ")
    };
    let scan = serde_json::to_string_pretty(&input.fact).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        r#"Analyze this project and respond with ONLY a JSON object (no markdown fences, no commentary):

{{
  "summary": "1-2 sentence description + current state",
  "nextAction": "single most important next step",
  "status": "{phases}",
  "statusReason": "why this status",
  "tags": ["3-8 descriptive tags"],
  "risks": ["0-3 risks"],
  "insights": ["3-5 distinct observations combining concern + action"],
  "framework": "primary framework or null",
  "primaryLanguage": "dominant language or null",
  "goal": "or null",
  "audience": "or null",
  "successMetrics": "or null",
  "publishTarget": "or null"
}}

Project data:

Name: {name}
Path: {path}
Status: {status}
Health Score: {health}/100
Hygiene Score: {hygiene}/100
Momentum Score: {momentum}/100
Derived Tags: {tags}

Raw scan data:
{scan}"#,
        phases = PHASES.join("|"),
        name = input.fact.name,
        path = input.fact.path,
        status = scored.status,
        health = scored.health,
        hygiene = scored.hygiene,
        momentum = scored.momentum,
    );

    if let Some(github) = &input.github {
        prompt.push_str(&format!(
            "\n\nGitHub data:\nOpen Issues: {}\nOpen PRs: {}\nCI Status: {}\nRepo Visibility: {}",
            github.open_issues, github.open_prs, github.ci_status, github.repo_visibility
        ));
        if !github.top_issues.is_empty() {
            prompt.push_str("\nTop Issues: ");
            prompt.push_str(&serde_json::to_string(&github.top_issues).unwrap_or_default());
        }
        if !github.top_prs.is_empty() {
            prompt.push_str("\nTop PRs: ");
            prompt.push_str(&serde_json::to_string(&github.top_prs).unwrap_or_default());
        }
    }

    if let Some(previous) = input.previous_summary.as_deref().filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\nPrevious summary (for continuity): ");
        prompt.push_str(previous);
    }

    prompt
}

/// Parse a model reply into an [`Enrichment`].
///
/// Accepts bare JSON or JSON embedded in surrounding text. Missing or
/// mistyped fields fall back to defaults; a reply with no JSON object at
/// all is an error.
pub fn parse_response(raw: &str) -> Result<Enrichment, EnrichError> {
    let obj = extract_object(raw)?
        .ok_or_else(|| EnrichError::Parse(format!("no JSON object in reply: {}", preview(raw))))?;

    let phase = string(&obj, "status")
        .or_else(|| string(&obj, "phase"))
        .filter(|p| PHASES.contains(&p.as_str()))
        .unwrap_or_else(|| DEFAULT_PHASE.to_string());

    let mut recommendations = strings(&obj, "insights");
    recommendations.extend(strings(&obj, "recommendations"));

    Ok(Enrichment {
        summary: string(&obj, "summary").unwrap_or_default(),
        next_action: string(&obj, "nextAction")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NEXT_ACTION.to_string()),
        phase,
        phase_reason: string(&obj, "statusReason")
            .or_else(|| string(&obj, "phaseReason"))
            .unwrap_or_default(),
        tags: strings(&obj, "tags"),
        risks: strings(&obj, "risks"),
        recommendations,
        framework: string(&obj, "framework"),
        primary_language: string(&obj, "primaryLanguage"),
        goal: string(&obj, "goal"),
        audience: string(&obj, "audience"),
        success_metrics: string(&obj, "successMetrics"),
        publish_target: string(&obj, "publishTarget"),
    })
}

/// The reply as a JSON object, falling back to the outermost `{...}` span.
fn extract_object(raw: &str) -> Result<Option<Map<String, Value>>, EnrichError> {
    if let Ok(Value::Object(obj)) = serde_json::from_str(raw.trim()) {
        return Ok(Some(obj));
    }
    let block = Regex::new(r"\{[\s\S]*\}").map_err(|e| EnrichError::Parse(e.to_string()))?;
    let Some(found) = block.find(raw) else {
        return Ok(None);
    };
    match serde_json::from_str(found.as_str()) {
        Ok(Value::Object(obj)) => Ok(Some(obj)),
        _ => Ok(None),
    }
}

fn string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

fn strings(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    obj.get(key)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default()
}

fn preview(raw: &str) -> String {
    let mut out: String = raw.chars().take(120).collect();
    if raw.chars().count() > 120 {
        out.push_str("...");
    }
    out
}
