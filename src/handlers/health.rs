//! Health check endpoint
//!
//! Provides a simple health check for monitoring and load balancers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Metrics status: "operational" or "degraded"
    pub metrics_status: &'static str,
    /// Identifier of the loaded local model, if any
    pub local_model: Option<String>,
}

/// Health check handler
///
/// Liveness only: returns 200 regardless of tier availability. Metrics
/// status is "degraded" once any metrics recording operation has failed.
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let metrics_status = if state.metrics().metrics_recording_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "OK",
            metrics_status,
            local_model: state.router().runner().model_id(),
        }),
    )
}
