//! Health check endpoint

use axum::{Json, extract::State, http::StatusCode};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Reports the override backend's health; 503 when it is down
pub async fn health_check(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, storage) = match state.registry.health().await {
        Ok(health) if health.healthy => (StatusCode::OK, "ok", health.message),
        Ok(health) => (StatusCode::SERVICE_UNAVAILABLE, "degraded", health.message),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, "degraded", e.to_string()),
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            storage,
        }),
    )
}
