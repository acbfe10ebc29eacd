//! HTTP request handlers for the hybridroute API

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::models::LocalModelRunner;
use crate::router::{InferenceRouter, SessionState};
use crate::shared::HttpTransport;
use axum::{
    Router, middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

pub mod availability;
pub mod generate;
pub mod health;
pub mod metrics;
pub mod preferences;
pub mod route;

/// Application state shared across all handlers
///
/// The server embeds a single session: preferences and the cached
/// availability snapshot live here, and are passed into the router on every
/// turn. All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    router: Arc<InferenceRouter>,
    session: Arc<RwLock<SessionState>>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// The session starts with the configured preferences and nothing known
    /// to be available.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics registry cannot be created.
    pub fn new(
        config: Arc<Config>,
        transport: Arc<dyn HttpTransport>,
        runner: Arc<dyn LocalModelRunner>,
    ) -> AppResult<Self> {
        let metrics = Metrics::new()
            .map_err(|e| AppError::Internal(format!("Failed to initialize metrics: {e}")))?;
        let router =
            InferenceRouter::from_config(&config, transport, runner, Arc::new(metrics));
        Ok(Self::from_parts(config, router))
    }

    /// Assemble state around an already built router
    pub fn from_parts(config: Arc<Config>, router: InferenceRouter) -> Self {
        let session = SessionState::new(config.preferences);
        Self {
            config,
            router: Arc::new(router),
            session: Arc::new(RwLock::new(session)),
        }
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the inference router
    pub fn router(&self) -> &InferenceRouter {
        &self.router
    }

    /// Get reference to the metrics collector
    pub fn metrics(&self) -> &Metrics {
        self.router.metrics()
    }

    /// Get the embedded session
    pub fn session(&self) -> &RwLock<SessionState> {
        &self.session
    }

    /// Probe availability and store the result in the session
    pub async fn refresh_availability(&self) -> crate::models::AvailabilityState {
        let last_known = self.session.read().await.availability;
        let state = self.router.probe_availability(&last_known).await;
        self.session.write().await.availability = state;
        state
    }
}

/// Build the HTTP application with all routes and middleware
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/metrics", get(metrics::handler))
        .route("/v1/availability", get(availability::get_handler))
        .route("/v1/availability/probe", post(availability::probe_handler))
        .route(
            "/v1/preferences",
            get(preferences::get_handler).put(preferences::put_handler),
        )
        .route("/v1/route", post(route::handler))
        .route("/v1/decision", get(route::last_decision_handler))
        .route("/v1/generate", post(generate::handler))
        .with_state(state)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}
