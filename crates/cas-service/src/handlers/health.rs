//! Health check handlers.
//!
//! - `/health`: liveness, no dependency checks
//! - `/ready`: readiness, pings the ticket store and reports draining

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// GET /health
pub async fn health_check() -> &'static str {
    "OK"
}

/// GET /ready
///
/// 503 while the ticket store is unreachable or the server is draining.
/// Backend errors are logged, never returned.
#[tracing::instrument(skip_all, name = "cas.health.readiness")]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.draining.load(Ordering::Relaxed) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "draining".to_string(),
                registry: None,
            }),
        );
    }

    if let Err(e) = state.cas.registry().ping().await {
        tracing::warn!(
            target: "cas.health",
            store = state.cas.registry().store_name(),
            error = %e,
            "Readiness check failed"
        );
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "not_ready".to_string(),
                registry: Some("unavailable".to_string()),
            }),
        );
    }

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ready".to_string(),
            registry: Some("healthy".to_string()),
        }),
    )
}
