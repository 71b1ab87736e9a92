use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: String,
    database: bool,
    /// Image diagnosis is refused while false
    classifier_loaded: bool,
}

/// Ready when the database answers; a missing classifier only degrades the service
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match state.repository.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!("Readiness check: database unreachable: {}", e);
            false
        }
    };

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            status: if database { "ready" } else { "not_ready" }.to_string(),
            database,
            classifier_loaded: state.assistant.classifier_loaded(),
        }),
    )
}
