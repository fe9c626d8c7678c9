//! Progress events emitted by a refresh run.
//!
//! Serialized as `{"type": "<snake_case>", ...camelCase fields}`; the SSE
//! transport uses the `type` value as the event name.

use serde::{Deserialize, Serialize};

/// Which per-project step an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Store,
    Llm,
}

/// Aggregate counts reported by the terminal `done` event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSummary {
    pub project_count: usize,
    /// Projects whose store step committed.
    pub completed: usize,
    pub llm_succeeded: usize,
    pub llm_failed: usize,
    pub llm_failed_names: Vec<String>,
    pub llm_skipped: usize,
    pub store_failed: usize,
    pub pruned: usize,
    pub restored: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PipelineEvent {
    ScanStart,
    ScanComplete {
        project_count: usize,
    },
    DeriveStart,
    DeriveComplete,
    ProjectStart {
        name: String,
        /// Zero-based position in the processing order.
        index: usize,
        total: usize,
        step: Step,
    },
    ProjectComplete {
        name: String,
        step: Step,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<serde_json::Value>,
    },
    ProjectError {
        name: String,
        step: Step,
        error: String,
    },
    Done(RunSummary),
    Cancelled {
        project_count: usize,
        completed: usize,
    },
    PipelineError {
        error: String,
    },
}

impl PipelineEvent {
    /// Wire name of this event, equal to the serialized `type` field.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ScanStart => "scan_start",
            Self::ScanComplete { .. } => "scan_complete",
            Self::DeriveStart => "derive_start",
            Self::DeriveComplete => "derive_complete",
            Self::ProjectStart { .. } => "project_start",
            Self::ProjectComplete { .. } => "project_complete",
            Self::ProjectError { .. } => "project_error",
            Self::Done(_) => "done",
            Self::Cancelled { .. } => "cancelled",
            Self::PipelineError { .. } => "pipeline_error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Cancelled { .. } | Self::PipelineError { .. })
    }

    /// JSON body without the `type` tag, as sent in an SSE `data:` line.
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("type");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let event = PipelineEvent::ProjectStart {
            name: "widget".into(),
            index: 0,
            total: 3,
            step: Step::Llm,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "project_start", "name": "widget", "index": 0, "total": 3, "step": "llm"})
        );

        let done = PipelineEvent::Done(RunSummary {
            project_count: 2,
            llm_failed: 1,
            llm_failed_names: vec!["b".into()],
            ..Default::default()
        });
        let value = serde_json::to_value(&done).unwrap();
        assert_eq!(value["type"], "done");
        assert_eq!(value["projectCount"], 2);
        assert_eq!(value["llmFailedNames"], json!(["b"]));
    }

    #[test]
    fn test_event_type_matches_tag() {
        let events = [
            PipelineEvent::ScanStart,
            PipelineEvent::ScanComplete { project_count: 1 },
            PipelineEvent::DeriveComplete,
            PipelineEvent::ProjectError {
                name: "a".into(),
                step: Step::Store,
                error: "disk".into(),
            },
            PipelineEvent::Cancelled {
                project_count: 4,
                completed: 1,
            },
            PipelineEvent::PipelineError { error: "x".into() },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn test_payload_strips_tag_and_omits_empty_detail() {
        let event = PipelineEvent::ProjectComplete {
            name: "a".into(),
            step: Step::Store,
            detail: None,
        };
        assert_eq!(event.payload(), json!({"name": "a", "step": "store"}));
        assert!(!event.is_terminal());
        assert!(PipelineEvent::PipelineError { error: "x".into() }.is_terminal());
    }

    #[test]
    fn test_round_trip_from_wire() {
        let parsed: PipelineEvent =
            serde_json::from_str(r#"{"type":"cancelled","projectCount":5,"completed":2}"#).unwrap();
        assert_eq!(
            parsed,
            PipelineEvent::Cancelled {
                project_count: 5,
                completed: 2
            }
        );
    }
}
