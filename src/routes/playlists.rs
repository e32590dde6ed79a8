//! Operator endpoints for playlist auto-update

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{GuideSummary, RunState};
use crate::services::job_runner::{UpdateError, UpdateReport};
use crate::AppState;

type ApiError = (StatusCode, Json<serde_json::Value>);

/// Query params for manual triggers
#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    /// Admin key for authorization (simple protection)
    pub key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: UpdateReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideResponse {
    pub playlist_id: Uuid,
    pub cached: bool,
    #[serde(flatten)]
    pub summary: Option<GuideSummary>,
}

fn validate_admin_key(state: &AppState, provided_key: Option<&str>) -> Result<(), ApiError> {
    match provided_key {
        Some(key) if key == state.config.admin_key => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid or missing admin key" })),
        )),
    }
}

/// Map a runner error to the HTTP status and body callers expect
fn error_response(err: UpdateError) -> ApiError {
    let status = match &err {
        UpdateError::Conflict { .. } => {
            return (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "conflict": true,
                    "message": err.to_string(),
                })),
            );
        }
        UpdateError::PlaylistNotFound(_) => StatusCode::NOT_FOUND,
        UpdateError::Fetch(_) => StatusCode::BAD_GATEWAY,
        UpdateError::Persistence(_) | UpdateError::Lock(_) | UpdateError::Crashed(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        UpdateError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": err.to_string(),
        })),
    )
}

/// POST /api/playlists/:id/run - Full update now, bypassing the schedule
pub async fn run_now(
    State(state): State<Arc<AppState>>,
    Path(playlist_id): Path<Uuid>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    tracing::info!(playlist_id = %playlist_id, "Manual update requested");

    let report = state
        .scheduler
        .run_now(playlist_id)
        .await
        .map_err(error_response)?;

    Ok(Json(RunResponse {
        success: true,
        report,
    }))
}

/// POST /api/playlists/:id/refresh-cache - Re-fetch the guide only
pub async fn refresh_cache(
    State(state): State<Arc<AppState>>,
    Path(playlist_id): Path<Uuid>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse, ApiError> {
    validate_admin_key(&state, query.key.as_deref())?;

    tracing::info!(playlist_id = %playlist_id, "Manual guide refresh requested");

    let report = state
        .scheduler
        .refresh_cache_only(playlist_id)
        .await
        .map_err(error_response)?;

    Ok(Json(RunResponse {
        success: true,
        report,
    }))
}

/// GET /api/playlists/:id/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(playlist_id): Path<Uuid>,
) -> Result<Json<RunState>, ApiError> {
    state
        .scheduler
        .get_status(playlist_id)
        .await
        .map(Json)
        .map_err(error_response)
}

/// GET /api/playlists/:id/guide - Cached counts, without the channel blob
pub async fn get_guide(
    State(state): State<Arc<AppState>>,
    Path(playlist_id): Path<Uuid>,
) -> Result<Json<GuideResponse>, ApiError> {
    let summary = state
        .scheduler
        .get_guide_summary(playlist_id)
        .await
        .map_err(error_response)?;

    Ok(Json(GuideResponse {
        playlist_id,
        cached: summary.is_some(),
        summary,
    }))
}
