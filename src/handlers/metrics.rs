//! Prometheus metrics endpoint
//!
//! Exposes metrics in Prometheus text format for scraping.

use axum::{extract::State, http::StatusCode};

use crate::handlers::AppState;

/// Metrics handler for Prometheus scraping
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics encoding fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:3000/metrics
/// # HELP hybridroute_decisions_total Total routing decisions by chosen tier and deciding rule
/// # TYPE hybridroute_decisions_total counter
/// hybridroute_decisions_total{rule="default",tier="on_premise"} 42
/// ```
pub async fn handler(State(state): State<AppState>) -> (StatusCode, String) {
    match state.metrics().gather() {
        Ok(output) => (StatusCode::OK, output),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to gather metrics: {e}"),
            )
        }
    }
}
