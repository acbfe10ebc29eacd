//! Routing decision endpoints

use axum::{Extension, Json, extract::State};
use serde::Deserialize;

use crate::handlers::AppState;
use crate::middleware::RequestId;
use crate::models::ConversationMessage;
use crate::router::RoutingDecision;

/// Body of POST /v1/route
#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub messages: Vec<ConversationMessage>,
}

/// POST /v1/route
///
/// Evaluates the routing policy against the session's preferences and
/// cached availability. Nothing is dispatched and nothing is recorded.
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RouteRequest>,
) -> Json<RoutingDecision> {
    let session = *state.session().read().await;
    let decision = state
        .router()
        .route(&request.messages, &session.preferences, &session.availability);

    tracing::debug!(
        request_id = %request_id,
        tier = %decision.tier(),
        rule = decision.rule().as_str(),
        reason = %decision.reason(),
        "Route preview"
    );
    Json(decision)
}

/// GET /v1/decision
///
/// The router's most recent decision, or `null` before the first turn.
pub async fn last_decision_handler(
    State(state): State<AppState>,
) -> Json<Option<RoutingDecision>> {
    Json(state.router().last_decision().await)
}
