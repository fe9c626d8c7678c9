//! API route modules.

pub mod export;
pub mod health;
pub mod projects;
pub mod refresh;

use axum::{http::StatusCode, routing::get, Router};
use projdash_core::Error;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(projects::router())
        .merge(refresh::router())
        .merge(export::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a core error to a response status and message.
pub fn error_response(e: Error) -> (StatusCode, String) {
    let status = match &e {
        Error::AlreadyRunning => StatusCode::CONFLICT,
        Error::ProjectNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}
