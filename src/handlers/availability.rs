//! Availability endpoints
//!
//! The cached snapshot is only refreshed by an explicit probe (or the
//! optional background loop); reading it never touches the network.

use axum::{Extension, Json, extract::State};

use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::models::AvailabilityState;

/// GET /v1/availability
pub async fn get_handler(State(state): State<AppState>) -> Json<AvailabilityState> {
    Json(state.session().read().await.availability)
}

/// POST /v1/availability/probe
///
/// Runs one probe, stores the result in the session and returns it.
pub async fn probe_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Json<AvailabilityState> {
    let availability = state.refresh_availability().await;
    tracing::info!(
        request_id = %request_id,
        connected = availability.connected,
        browser_ready = availability.browser_ready,
        on_premise = availability.on_premise_reachable,
        cloud = availability.cloud_reachable,
        "Availability refreshed"
    );
    Json(availability)
}
