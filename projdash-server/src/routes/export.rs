//! Markdown export route.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use projdash_core::export::render_markdown;
use std::sync::Arc;

use super::error_response;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/export", get(export_markdown))
}

/// GET /api/export - the whole inventory as Markdown
pub async fn export_markdown(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let views = state.db.merged_views().map_err(error_response)?;
    let body = render_markdown(&views, Utc::now());
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], body))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{fixture, get, seed, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_export_lists_projects() {
        let f = fixture();
        seed(&f).await;
        let (status, body) = send(&f.app, get("/api/export")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("# Project inventory"));
        assert!(body.contains("(2 projects)"));
        assert!(body.contains("## alpha"));
        assert!(body.contains("## beta"));
    }
}
