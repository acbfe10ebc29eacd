//! Session preference endpoints

use axum::{Extension, Json, extract::State};

use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::router::RoutingPreferences;

/// GET /v1/preferences
pub async fn get_handler(State(state): State<AppState>) -> Json<RoutingPreferences> {
    Json(state.session().read().await.preferences)
}

/// PUT /v1/preferences
///
/// Replaces the session preferences. Omitted fields take their defaults,
/// not their previous values.
pub async fn put_handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(preferences): Json<RoutingPreferences>,
) -> Json<RoutingPreferences> {
    state.session().write().await.preferences = preferences;
    tracing::info!(
        request_id = %request_id,
        preferences = ?preferences,
        "Routing preferences updated"
    );
    Json(preferences)
}
