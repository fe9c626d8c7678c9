//! Fold of progress events into display state.
//!
//! `reduce` is pure: it consumes the previous state and returns the next.
//! Unknown event types and malformed payloads leave the state unchanged so
//! older clients keep working against newer servers.

use serde::Serialize;
use serde_json::Value;

use crate::pipeline::{PipelineEvent, RunSummary, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Pending,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmStatus {
    Pending,
    Running,
    Done,
    Error,
    Skipped,
}

/// Progress of one project within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgress {
    pub name: String,
    pub store: StoreStatus,
    pub llm: LlmStatus,
    pub error: Option<String>,
    pub detail: Option<Value>,
}

impl ProjectProgress {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            store: StoreStatus::Pending,
            llm: LlmStatus::Pending,
            error: None,
            detail: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshState {
    pub active: bool,
    pub phase: String,
    /// Projects in the order they were first seen.
    pub projects: Vec<ProjectProgress>,
    /// True once any project has finished its store step; live data may be
    /// shown even while enrichment continues.
    pub deterministic_ready: bool,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl RefreshState {
    /// State for a freshly opened stream.
    pub fn connecting() -> Self {
        Self {
            active: true,
            phase: "Connecting...".to_string(),
            ..Default::default()
        }
    }

    pub fn project(&self, name: &str) -> Option<&ProjectProgress> {
        self.projects.iter().find(|p| p.name == name)
    }

    /// Whether a terminal event (or local cancel) has been applied.
    pub fn is_finished(&self) -> bool {
        self.summary.is_some() || self.error.is_some() || self.cancelled
    }

    /// The stream closed. An error unless the run already finished.
    pub fn connection_lost(mut self) -> Self {
        if self.is_finished() {
            return self;
        }
        self.active = false;
        self.phase = "Error".to_string();
        self.error = Some("Connection lost".to_string());
        self
    }

    /// The user stopped the run locally.
    pub fn cancel(mut self) -> Self {
        self.active = false;
        self.phase = "Cancelled".to_string();
        self.cancelled = true;
        self
    }

    fn entry(&mut self, name: &str) -> &mut ProjectProgress {
        let pos = match self.projects.iter().position(|p| p.name == name) {
            Some(pos) => pos,
            None => {
                self.projects.push(ProjectProgress::new(name));
                self.projects.len() - 1
            }
        };
        &mut self.projects[pos]
    }

    /// Apply one typed event.
    pub fn apply(mut self, event: &PipelineEvent) -> Self {
        match event {
            PipelineEvent::ScanStart => {
                self.phase = "Scanning filesystem...".to_string();
            }
            PipelineEvent::ScanComplete { project_count } => {
                self.phase = format!("Found {} projects. Deriving...", project_count);
            }
            PipelineEvent::DeriveStart => {
                self.phase = "Computing status and health scores...".to_string();
            }
            PipelineEvent::DeriveComplete => {
                self.phase = "Storing results...".to_string();
            }
            PipelineEvent::ProjectStart {
                name,
                index,
                total,
                step,
            } => {
                let progress = self.entry(name);
                let verb = match step {
                    Step::Store => {
                        progress.store = StoreStatus::Running;
                        "Processing"
                    }
                    Step::Llm => {
                        progress.llm = LlmStatus::Running;
                        "LLM enriching"
                    }
                };
                self.phase = format!("{} {} ({}/{})", verb, name, index + 1, total);
            }
            PipelineEvent::ProjectComplete { name, step, detail } => {
                let progress = self.entry(name);
                match step {
                    Step::Store => {
                        progress.store = StoreStatus::Done;
                        progress.detail = detail.clone();
                        self.deterministic_ready = true;
                    }
                    Step::Llm => {
                        progress.llm = LlmStatus::Done;
                        progress.detail = merge_detail(progress.detail.take(), detail.as_ref());
                    }
                }
            }
            PipelineEvent::ProjectError { name, step, error } => {
                let progress = self.entry(name);
                match step {
                    Step::Store => {
                        progress.store = StoreStatus::Error;
                        progress.llm = LlmStatus::Skipped;
                    }
                    Step::Llm => progress.llm = LlmStatus::Error,
                }
                progress.error = Some(error.clone());
            }
            PipelineEvent::Done(summary) => {
                for progress in &mut self.projects {
                    if progress.llm == LlmStatus::Pending {
                        progress.llm = LlmStatus::Skipped;
                    }
                }
                self.active = false;
                self.phase = "Complete".to_string();
                self.summary = Some(summary.clone());
            }
            PipelineEvent::Cancelled { .. } => {
                return self.cancel();
            }
            PipelineEvent::PipelineError { error } => {
                self.active = false;
                self.phase = "Error".to_string();
                self.error = Some(error.clone());
            }
        }
        self
    }
}

/// Shallow-merge `extra` object fields over `base`.
fn merge_detail(base: Option<Value>, extra: Option<&Value>) -> Option<Value> {
    match (base, extra) {
        (Some(Value::Object(mut base)), Some(Value::Object(extra))) => {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
            Some(Value::Object(base))
        }
        (base, None) => base,
        (_, Some(extra)) => Some(extra.clone()),
    }
}

/// Apply an event given its wire type and JSON payload.
pub fn reduce(state: RefreshState, event_type: &str, payload: &Value) -> RefreshState {
    let mut tagged = match payload {
        Value::Object(map) => map.clone(),
        Value::Null => serde_json::Map::new(),
        _ => return state,
    };
    tagged.insert("type".to_string(), Value::String(event_type.to_string()));

    match serde_json::from_value::<PipelineEvent>(Value::Object(tagged)) {
        Ok(event) => state.apply(&event),
        Err(_) => state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fold(events: &[(&str, Value)]) -> RefreshState {
        events
            .iter()
            .fold(RefreshState::connecting(), |s, (t, p)| reduce(s, t, p))
    }

    #[test]
    fn test_phase_texts() {
        let s = fold(&[("scan_start", Value::Null)]);
        assert_eq!(s.phase, "Scanning filesystem...");
        let s = reduce(s, "scan_complete", &json!({"projectCount": 12}));
        assert_eq!(s.phase, "Found 12 projects. Deriving...");
        let s = reduce(s, "derive_start", &json!({}));
        assert_eq!(s.phase, "Computing status and health scores...");
        let s = reduce(s, "derive_complete", &json!({}));
        assert_eq!(s.phase, "Storing results...");
        let s = reduce(
            s,
            "project_start",
            &json!({"name": "alpha", "index": 0, "total": 12, "step": "store"}),
        );
        assert_eq!(s.phase, "Processing alpha (1/12)");
        let s = reduce(
            s,
            "project_start",
            &json!({"name": "alpha", "index": 0, "total": 12, "step": "llm"}),
        );
        assert_eq!(s.phase, "LLM enriching alpha (1/12)");
    }

    #[test]
    fn test_deterministic_ready_flips_on_first_store() {
        let s = fold(&[
            ("project_start", json!({"name": "a", "index": 0, "total": 2, "step": "store"})),
        ]);
        assert!(!s.deterministic_ready);
        assert_eq!(s.project("a").unwrap().store, StoreStatus::Running);

        let s = reduce(
            s,
            "project_complete",
            &json!({"name": "a", "step": "store", "detail": {"status": "active", "healthScore": 80}}),
        );
        assert!(s.deterministic_ready);
        let a = s.project("a").unwrap();
        assert_eq!(a.store, StoreStatus::Done);
        assert_eq!(a.llm, LlmStatus::Pending);
        assert_eq!(a.detail.as_ref().unwrap()["healthScore"], 80);
    }

    #[test]
    fn test_llm_detail_merges_and_errors_are_per_project() {
        let s = fold(&[
            ("project_complete", json!({"name": "a", "step": "store", "detail": {"status": "active"}})),
            ("project_complete", json!({"name": "a", "step": "llm", "detail": {"summary": "hi"}})),
            ("project_complete", json!({"name": "b", "step": "store"})),
            ("project_error", json!({"name": "b", "step": "llm", "error": "timeout"})),
        ]);
        let a = s.project("a").unwrap();
        assert_eq!(a.llm, LlmStatus::Done);
        assert_eq!(a.detail, Some(json!({"status": "active", "summary": "hi"})));

        let b = s.project("b").unwrap();
        assert_eq!(b.llm, LlmStatus::Error);
        assert_eq!(b.error.as_deref(), Some("timeout"));
        assert!(s.active);
    }

    #[test]
    fn test_done_marks_pending_llm_skipped() {
        let s = fold(&[
            ("project_complete", json!({"name": "a", "step": "store"})),
            (
                "done",
                json!({"projectCount": 1, "completed": 1, "llmSucceeded": 0, "llmFailed": 0,
                       "llmFailedNames": [], "llmSkipped": 1, "storeFailed": 0,
                       "pruned": 0, "restored": 0, "durationMs": 15}),
            ),
        ]);
        assert!(!s.active);
        assert_eq!(s.phase, "Complete");
        assert_eq!(s.summary.as_ref().unwrap().llm_skipped, 1);
        assert_eq!(s.project("a").unwrap().llm, LlmStatus::Skipped);

        // A closed stream after completion is not an error.
        let s = s.connection_lost();
        assert!(s.error.is_none());
        assert_eq!(s.phase, "Complete");
    }

    #[test]
    fn test_terminal_error_and_cancel() {
        let s = fold(&[("pipeline_error", json!({"error": "scan root not found"}))]);
        assert_eq!(s.phase, "Error");
        assert_eq!(s.error.as_deref(), Some("scan root not found"));
        assert!(!s.active);

        let s = fold(&[("cancelled", json!({"projectCount": 3, "completed": 1}))]);
        assert_eq!(s.phase, "Cancelled");
        assert!(s.cancelled);

        let s = RefreshState::connecting().connection_lost();
        assert_eq!(s.error.as_deref(), Some("Connection lost"));

        let s = RefreshState::connecting().cancel();
        assert_eq!(s.phase, "Cancelled");
        assert!(!s.active);
    }

    #[test]
    fn test_unknown_or_malformed_events_are_ignored() {
        let before = fold(&[("scan_start", Value::Null)]);
        let after = reduce(before.clone(), "github_sync", &json!({"repo": "x"}));
        assert_eq!(after, before);

        let after = reduce(before.clone(), "project_start", &json!({"name": 5}));
        assert_eq!(after, before);

        let after = reduce(before.clone(), "scan_complete", &json!("garbage"));
        assert_eq!(after, before);
    }
}
