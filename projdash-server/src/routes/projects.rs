//! Project inventory routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use projdash_core::db::{ActivityRecord, MetadataPatch, OverridePatch};
use projdash_core::MergedView;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::error_response;
use crate::state::AppState;

const ACTIVITY_LIMIT: usize = 20;

/// Create project router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/projects", get(list_projects))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/override", patch(update_override))
        .route("/projects/{id}/metadata", patch(update_metadata))
        .route("/projects/{id}/pin", post(toggle_pin))
        .route("/projects/{id}/touch", post(touch_project))
        .route("/projects/{id}/activity", get(list_activity))
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Project not found".to_string())
}

fn ensure_exists(state: &AppState, id: &str) -> Result<(), (StatusCode, String)> {
    state
        .db
        .get_project(id)
        .map_err(error_response)?
        .map(|_| ())
        .ok_or_else(not_found)
}

fn merged(state: &AppState, id: &str) -> Result<Json<MergedView>, (StatusCode, String)> {
    state
        .db
        .merged_view(id)
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(not_found)
}

/// List all non-pruned projects, sorted by name
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MergedView>>, (StatusCode, String)> {
    let views = state.db.merged_views().map_err(error_response)?;
    Ok(Json(views))
}

/// Get one merged project view
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MergedView>, (StatusCode, String)> {
    merged(&state, &id)
}

/// Patch the user override layer. `null` clears a field.
pub async fn update_override(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<MergedView>, (StatusCode, String)> {
    ensure_exists(&state, &id)?;
    let patch: OverridePatch = serde_json::from_value(body.clone())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if patch.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No fields to update".to_string()));
    }

    let now = Utc::now().timestamp_millis();
    state
        .db
        .update_override(&id, &patch, now)
        .map_err(error_response)?;
    state
        .db
        .append_activity(&id, "override", &body, now)
        .map_err(error_response)?;

    merged(&state, &id)
}

/// Patch the user metadata layer. `null` clears a field.
pub async fn update_metadata(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<MergedView>, (StatusCode, String)> {
    ensure_exists(&state, &id)?;
    let patch: MetadataPatch = serde_json::from_value(body.clone())
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    if patch.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No fields to update".to_string()));
    }

    let now = Utc::now().timestamp_millis();
    state
        .db
        .update_metadata(&id, &patch, now)
        .map_err(error_response)?;
    state
        .db
        .append_activity(&id, "metadata", &body, now)
        .map_err(error_response)?;

    merged(&state, &id)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PinResponse {
    pub pinned: bool,
}

/// Toggle the pinned flag
pub async fn toggle_pin(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PinResponse>, (StatusCode, String)> {
    let pinned = state
        .db
        .toggle_pin(&id, Utc::now().timestamp_millis())
        .map_err(error_response)?
        .ok_or_else(not_found)?;
    Ok(Json(PinResponse { pinned }))
}

/// Mark a project as just opened
pub async fn touch_project(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let now = Utc::now().timestamp_millis();
    let found = state.db.touch_project(&id, now).map_err(error_response)?;
    if !found {
        return Err(not_found());
    }
    state
        .db
        .append_activity(&id, "opened", &json!({}), now)
        .map_err(error_response)?;
    Ok(Json(json!({ "lastTouchedAt": now })))
}

/// Most recent activity entries, newest first
pub async fn list_activity(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ActivityRecord>>, (StatusCode, String)> {
    ensure_exists(&state, &id)?;
    let records = state
        .db
        .list_activity(&id, ACTIVITY_LIMIT)
        .map_err(error_response)?;
    Ok(Json(records))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{fixture, get, patch_json, post, seed, send, Fixture};
    use axum::http::StatusCode;
    use serde_json::Value;

    async fn ids(f: &Fixture) -> Vec<(String, String)> {
        let (status, body) = send(&f.app, get("/api/projects")).await;
        assert_eq!(status, StatusCode::OK);
        let views: Vec<Value> = serde_json::from_str(&body).unwrap();
        views
            .iter()
            .map(|v| {
                (
                    v["name"].as_str().unwrap().to_string(),
                    v["id"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_sorted_by_name() {
        let f = fixture();
        seed(&f).await;
        let names: Vec<String> = ids(&f).await.into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_unknown_project_is_404() {
        let f = fixture();
        for request in [
            get("/api/projects/nope"),
            patch_json("/api/projects/nope/override", r#"{"notes":"x"}"#),
            patch_json("/api/projects/nope/metadata", r#"{"goal":"x"}"#),
            post("/api/projects/nope/pin"),
            post("/api/projects/nope/touch"),
            get("/api/projects/nope/activity"),
        ] {
            let (status, _) = send(&f.app, request).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_override_updates_view_and_logs_activity() {
        let f = fixture();
        seed(&f).await;
        let (_, id) = ids(&f).await.remove(0);

        let (status, body) = send(
            &f.app,
            patch_json(
                &format!("/api/projects/{}/override", id),
                r#"{"status":"paused","notes":"on hold"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["status"], "paused");
        assert_eq!(view["notes"], "on hold");

        // null clears
        let (_, body) = send(
            &f.app,
            patch_json(&format!("/api/projects/{}/override", id), r#"{"status":null}"#),
        )
        .await;
        let view: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["status"], "archived");
        assert_eq!(view["notes"], "on hold");

        let (_, body) = send(&f.app, get(&format!("/api/projects/{}/activity", id))).await;
        let activity: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(activity[0]["kind"], "override");
        assert_eq!(activity[0]["payload"]["status"], Value::Null);
    }

    #[tokio::test]
    async fn test_empty_patch_is_400() {
        let f = fixture();
        seed(&f).await;
        let (_, id) = ids(&f).await.remove(0);

        for path in ["override", "metadata"] {
            let (status, _) = send(
                &f.app,
                patch_json(&format!("/api/projects/{}/{}", id, path), "{}"),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }

        let (status, _) = send(
            &f.app,
            patch_json(&format!("/api/projects/{}/override", id), r#"{"status":"exploding"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metadata_patch() {
        let f = fixture();
        seed(&f).await;
        let (_, id) = ids(&f).await.remove(1);

        let (status, body) = send(
            &f.app,
            patch_json(
                &format!("/api/projects/{}/metadata", id),
                r#"{"goal":"Ship v1","nextAction":"Write docs"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let view: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["goal"], "Ship v1");
        assert_eq!(view["nextAction"], "Write docs");
    }

    #[tokio::test]
    async fn test_pin_toggles_and_touch_logs_opened() {
        let f = fixture();
        seed(&f).await;
        let (_, id) = ids(&f).await.remove(0);

        let (_, body) = send(&f.app, post(&format!("/api/projects/{}/pin", id))).await;
        assert_eq!(body, r#"{"pinned":true}"#);
        let (_, body) = send(&f.app, post(&format!("/api/projects/{}/pin", id))).await;
        assert_eq!(body, r#"{"pinned":false}"#);

        let (status, body) = send(&f.app, post(&format!("/api/projects/{}/touch", id))).await;
        assert_eq!(status, StatusCode::OK);
        let touched: Value = serde_json::from_str(&body).unwrap();
        assert!(touched["lastTouchedAt"].as_i64().unwrap() > 0);

        let (_, body) = send(&f.app, get(&format!("/api/projects/{}", id))).await;
        let view: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(view["lastTouchedAt"], touched["lastTouchedAt"]);

        let (_, body) = send(&f.app, get(&format!("/api/projects/{}/activity", id))).await;
        let activity: Vec<Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(activity[0]["kind"], "opened");
    }
}
