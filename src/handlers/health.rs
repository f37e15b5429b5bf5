use std::time::Instant;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;

/// Component health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub database: ComponentStatus,
    pub version: String,
    pub latency_ms: u64,
}

/// Liveness plus a database ping
#[utoipa::path(
    get,
    path = "/health",
    summary = "Health check",
    responses(
        (status = 200, description = "Service and database are up", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let started = Instant::now();
    let db_result = crate::db::check_connection(&state.db).await;
    let latency_ms = started.elapsed().as_millis() as u64;

    let (status, database) = match &db_result {
        Ok(()) => (StatusCode::OK, ComponentStatus::Up),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed to reach database");
            (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Down)
        }
    };

    (
        status,
        Json(HealthResponse {
            status: database,
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
            latency_ms,
        }),
    )
}
