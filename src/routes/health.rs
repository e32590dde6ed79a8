use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;

use crate::config::LockBackend;
use crate::db;
use crate::AppState;

/// Root endpoint - basic status
pub async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "Guide Sync Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "runtime": "rust"
    }))
}

/// Health check response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    uptime: u64,
    environment: String,
    postgres: bool,
    /// None when locks are process-local and Redis is not used
    #[serde(skip_serializing_if = "Option::is_none")]
    redis: Option<bool>,
    lock_backend: &'static str,
}

async fn redis_ok(state: &AppState) -> Option<bool> {
    match &state.redis {
        Some(redis) => Some(redis.ping().await.unwrap_or(false)),
        None => None,
    }
}

/// Postgres down is unhealthy. Redis down is degraded: status reads still
/// work but no run can take its lock.
fn overall_status(postgres_ok: bool, redis_ok: Option<bool>) -> &'static str {
    match (postgres_ok, redis_ok) {
        (true, Some(true)) | (true, None) => "ok",
        (true, Some(false)) => "degraded",
        (false, _) => "unhealthy",
    }
}

/// GET /health - Advanced health check
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let postgres_ok = db::health_check(&state.pool).await;
    let redis_ok = redis_ok(&state).await;

    Json(HealthResponse {
        status: overall_status(postgres_ok, redis_ok),
        uptime: state.start_time.elapsed().as_secs(),
        environment: state.config.app_env.clone(),
        postgres: postgres_ok,
        redis: redis_ok,
        lock_backend: match state.config.lock_backend {
            LockBackend::Redis => "redis",
            LockBackend::Memory => "memory",
        },
    })
}

/// GET /metrics - Prometheus metrics
pub async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                b"Internal Server Error".to_vec(),
            )
        }
    }
}

/// Readiness probe (for Kubernetes)
pub async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let postgres_ok = db::health_check(&state.pool).await;
    let redis_ok = redis_ok(&state).await.unwrap_or(true);

    match (postgres_ok, redis_ok) {
        (true, true) => (StatusCode::OK, "ready"),
        (true, false) => (StatusCode::SERVICE_UNAVAILABLE, "not ready - redis unavailable"),
        (false, true) => (StatusCode::SERVICE_UNAVAILABLE, "not ready - postgres unavailable"),
        (false, false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "not ready - postgres and redis unavailable",
        ),
    }
}

/// Liveness probe (for Kubernetes)
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}
