//! Dispatcher API handlers.
//!
//! Anything that takes the pool lock is wrapped in
//! `tokio::task::spawn_blocking()`: the lock can be held for the length
//! of a probe, which would stall Tokio's worker threads.

use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::instrument;

use super::error::ApiError;
use super::types::*;
use super::AppState;

/// Dispatcher self-health.
#[utoipa::path(
    get,
    path = "/healthcheck",
    responses(
        (status = 200, description = "Dispatcher is healthy", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn healthcheck() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Dispatcher version.
#[utoipa::path(
    get,
    path = "/version",
    responses(
        (status = 200, description = "Dispatcher version", body = VersionResponse),
    ),
    tag = "health"
)]
pub async fn version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Seconds since the most recent compute request.
///
/// Polled by workers launched with `-idlespan` to decide when to
/// self-terminate. Returns `-1` before the first request. Serving this
/// endpoint does not itself count as activity.
#[utoipa::path(
    get,
    path = "/idlespan",
    responses(
        (status = 200, description = "Idle seconds as ASCII decimal", body = String),
    ),
    tag = "workers"
)]
#[instrument(skip(state))]
pub async fn idlespan(State(state): State<Arc<AppState>>) -> String {
    state.scheduler.idle_seconds().to_string()
}

/// Live worker summary.
#[utoipa::path(
    get,
    path = "/activechildren",
    responses(
        (status = 200, description = "Live worker summary", body = ActiveChildrenResponse),
    ),
    tag = "workers"
)]
#[instrument(skip(state))]
pub async fn activechildren(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveChildrenResponse>, ApiError> {
    let scheduler = state.scheduler.clone();
    let stats = tokio::task::spawn_blocking(move || scheduler.stats())
        .await
        .map_err(|e| ApiError::internal(format!("Task join error: {}", e)))?;

    Ok(Json(ActiveChildrenResponse {
        active_children: stats.alive,
        ports: stats.ports,
    }))
}
