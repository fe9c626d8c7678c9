//! Refresh routes: streamed progress over SSE and a blocking variant.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use projdash_core::pipeline::{EventSink, RunOptions};
use projdash_core::{RunOutcome, RunSummary};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error_response;
use crate::state::AppState;

/// Create refresh router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/refresh/stream", get(refresh_stream))
        .route("/refresh", post(refresh_blocking))
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    /// `scan` skips enrichment; anything else runs the full pipeline.
    pub mode: Option<String>,
}

impl RefreshQuery {
    fn options(&self) -> RunOptions {
        RunOptions {
            skip_enrichment: self.mode.as_deref() == Some("scan"),
        }
    }
}

/// GET /api/refresh/stream - run a refresh and stream its progress
///
/// Each pipeline event becomes `event: <type>` with the camelCase payload
/// as `data`. The stream ends after the terminal event. Dropping the
/// connection cancels the run.
pub async fn refresh_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefreshQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    // Reject before any bytes of a stream are sent.
    let permit = state.orchestrator.try_begin().map_err(error_response)?;
    info!("SSE client started a refresh (mode {:?})", query.mode);

    let (sink, mut rx) = EventSink::channel(state.config.pipeline.event_buffer);
    let cancel = CancellationToken::new();
    let orchestrator = Arc::clone(&state.orchestrator);
    let run_cancel = cancel.clone();
    let options = query.options();
    tokio::spawn(async move {
        if let Err(e) = orchestrator
            .run_with_permit(permit, sink, run_cancel, options)
            .await
        {
            warn!("Streamed refresh failed: {}", e);
        }
    });

    let disconnect = cancel.drop_guard();
    let stream = async_stream::stream! {
        // Held by the stream: when axum drops it, the run is cancelled.
        let disconnect = disconnect;
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            debug!("SSE: sending {}", event.event_type());
            yield Ok(Event::default()
                .event(event.event_type())
                .data(event.payload().to_string()));
            if terminal {
                break;
            }
        }
        disconnect.disarm();
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub cancelled: bool,
    pub summary: RunSummary,
}

/// POST /api/refresh - run a refresh to completion and return its summary
pub async fn refresh_blocking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefreshQuery>,
) -> Result<Json<RefreshResponse>, (StatusCode, String)> {
    let outcome = state
        .orchestrator
        .run(EventSink::noop(), CancellationToken::new(), query.options())
        .await
        .map_err(error_response)?;

    let cancelled = outcome.is_cancelled();
    let summary = match outcome {
        RunOutcome::Completed(summary) | RunOutcome::Cancelled(summary) => summary,
    };
    Ok(Json(RefreshResponse { cancelled, summary }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{fixture, fixture_with_enricher, get, post, send};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use futures::StreamExt;
    use projdash_core::enrich::{EnrichError, Enricher, Enrichment, EnrichmentInput};
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Notify;
    use tower::ServiceExt;

    /// Signals when a call starts, then never answers.
    struct StallingEnricher {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Enricher for StallingEnricher {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn enrich(&self, _input: &EnrichmentInput) -> Result<Enrichment, EnrichError> {
            self.started.notify_one();
            std::future::pending().await
        }
    }

    /// Split an SSE body into (event, data) pairs, skipping comments.
    fn parse_sse(body: &str) -> Vec<(String, Value)> {
        body.split("\n\n")
            .filter_map(|frame| {
                let mut event = None;
                let mut data = None;
                for line in frame.lines() {
                    if let Some(v) = line.strip_prefix("event:") {
                        event = Some(v.trim().to_string());
                    } else if let Some(v) = line.strip_prefix("data:") {
                        data = serde_json::from_str(v.trim()).ok();
                    }
                }
                Some((event?, data?))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_stream_emits_ordered_events_and_ends() {
        let f = fixture();
        let (status, body) = send(&f.app, get("/api/refresh/stream?mode=scan")).await;
        assert_eq!(status, StatusCode::OK);

        let events = parse_sse(&body);
        let types: Vec<&str> = events.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(&types[..4], ["scan_start", "scan_complete", "derive_start", "derive_complete"]);
        assert_eq!(types.last(), Some(&"done"));
        assert_eq!(types.iter().filter(|t| **t == "project_start").count(), 2);

        let (_, scan_complete) = &events[1];
        assert_eq!(scan_complete["projectCount"], 2);
        // The tag travels as the SSE event name, not in the data.
        assert!(scan_complete.get("type").is_none());

        let (_, done) = events.last().unwrap();
        assert_eq!(done["completed"], 2);
        assert_eq!(done["llmSkipped"], 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_409() {
        let f = fixture();
        let _permit = f.state.orchestrator.try_begin().unwrap();

        let (status, _) = send(&f.app, get("/api/refresh/stream")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send(&f.app, post("/api/refresh")).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_blocking_refresh_returns_summary() {
        let f = fixture();
        let (status, body) = send(&f.app, post("/api/refresh?mode=scan")).await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["cancelled"], false);
        assert_eq!(json["summary"]["projectCount"], 2);
        assert_eq!(json["summary"]["storeFailed"], 0);
    }

    #[tokio::test]
    async fn test_dropped_stream_cancels_run() {
        let started = Arc::new(Notify::new());
        let f = fixture_with_enricher(Arc::new(StallingEnricher {
            started: started.clone(),
        }));

        let response = f.app.clone().oneshot(get("/api/refresh/stream")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let mut body = response.into_body().into_data_stream();
        let first = body.next().await.unwrap().unwrap();
        assert!(String::from_utf8_lossy(&first).contains("scan_start"));

        tokio::time::timeout(Duration::from_secs(5), started.notified())
            .await
            .expect("enrichment never started");
        drop(body);

        let mut released = false;
        for _ in 0..250 {
            if !f.state.orchestrator.is_running() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(released, "run guard still held after disconnect");
        let _permit = f.state.orchestrator.try_begin().unwrap();

        // The stalled call was abandoned and the second project never started.
        let layers = f.state.db.list_layers().unwrap();
        assert_eq!(layers.len(), 1);
        let error = layers[0].enrichment.as_ref().and_then(|e| e.error.clone());
        assert_eq!(error.as_deref(), Some("enrichment cancelled"));
    }
}
