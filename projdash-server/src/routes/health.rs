//! Health check endpoint.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub refresh: RefreshStatus,
}

#[derive(Serialize)]
pub struct HealthComponents {
    pub database: bool,
    /// Configured enrichment backend, if any
    pub enricher: Option<String>,
}

#[derive(Serialize)]
pub struct RefreshStatus {
    pub running: bool,
    pub started_at: Option<DateTime<Utc>>,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    let db_healthy = state.db.ping().is_ok();

    Json(HealthStatus {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            enricher: state.orchestrator.enricher_name().map(String::from),
        },
        refresh: RefreshStatus {
            running: state.orchestrator.is_running(),
            started_at: state.orchestrator.running_since(),
        },
    })
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{fixture, get, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_database_and_idle_refresh() {
        let f = fixture();
        let (status, body) = send(&f.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"]["database"], true);
        assert_eq!(json["components"]["enricher"], serde_json::Value::Null);
        assert_eq!(json["refresh"]["running"], false);
    }
}
