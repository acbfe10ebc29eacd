//! Hybrid inference router
//!
//! Ties the decision engine, dispatcher, fallback orchestrator and
//! availability probe together behind the caller-facing operations.

use super::fallback::{FallbackOrchestrator, Turn, observed_dispatch};
use super::{DecisionEngine, RoutingDecision, RoutingPreferences, SessionState};
use crate::config::Config;
use crate::error::RouterError;
use crate::metrics::{self, Metrics, Outcome};
use crate::models::{
    AvailabilityProbe, AvailabilityState, ConversationMessage, GenerationConfig, LocalModelRunner,
};
use crate::shared::dispatch::TierTimeouts;
use crate::shared::{ChatCompletionClient, Dispatcher, HttpTransport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Completed generation, annotated with the decision that produced it
///
/// The decision names the tier actually used (after any fallback) and
/// carries the measured latency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Generation {
    pub response: String,
    pub decision: RoutingDecision,
}

/// Receives the streamed output of a turn
///
/// When an attempt fails after streaming part of its output and another tier
/// takes over, [`StreamSink::reset`] is called before the new tier's first
/// delta. The deltas received since the last reset concatenate to the final
/// response.
pub trait StreamSink: Send + Sync {
    /// Next content fragment, in arrival order
    fn delta(&self, content: &str);

    /// Discard every delta received so far
    fn reset(&self);
}

/// Per-turn inference router
///
/// Holds no session state besides the most recent decision; preferences
/// and availability are passed in by the caller on every turn.
pub struct InferenceRouter {
    engine: DecisionEngine,
    dispatcher: Dispatcher,
    probe: AvailabilityProbe,
    metrics: Arc<Metrics>,
    last_decision: RwLock<Option<RoutingDecision>>,
}

impl InferenceRouter {
    pub fn new(dispatcher: Dispatcher, probe: AvailabilityProbe, metrics: Arc<Metrics>) -> Self {
        Self {
            engine: DecisionEngine::new(),
            dispatcher,
            probe,
            metrics,
            last_decision: RwLock::new(None),
        }
    }

    /// Build a router from configuration
    ///
    /// The transport is shared by remote dispatch and the availability probe.
    pub fn from_config(
        config: &Config,
        transport: Arc<dyn HttpTransport>,
        runner: Arc<dyn LocalModelRunner>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            ChatCompletionClient::new(transport.clone()),
            runner.clone(),
            config.endpoints.clone(),
            TierTimeouts::from_config(config),
        );
        let probe = AvailabilityProbe::new(
            transport,
            runner,
            config.endpoints.health(),
            Duration::from_secs(config.health_timeout()),
        );
        Self::new(dispatcher, probe, metrics)
    }

    /// Get the local model runner
    pub fn runner(&self) -> &Arc<dyn LocalModelRunner> {
        self.dispatcher.runner()
    }

    /// Get reference to the metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Refresh availability, starting from the caller's last known snapshot
    ///
    /// Never fails; see [`AvailabilityProbe::probe`].
    pub async fn probe_availability(&self, last_known: &AvailabilityState) -> AvailabilityState {
        let state = self.probe.probe(last_known).await;
        let outcome = if state.connected {
            Outcome::Success
        } else {
            Outcome::Failure
        };
        metrics::observe(&self.metrics, "record_probe", self.metrics.record_probe(outcome));
        state
    }

    /// Choose a tier for the next turn without dispatching
    pub fn route(
        &self,
        conversation: &[ConversationMessage],
        preferences: &RoutingPreferences,
        availability: &AvailabilityState,
    ) -> RoutingDecision {
        self.engine.route(conversation, preferences, availability)
    }

    /// Route, dispatch and recover from failure
    ///
    /// Uses the session's availability as-is; callers refresh it with
    /// [`Self::probe_availability`] when they want fresh flags.
    ///
    /// # Errors
    ///
    /// Returns a [`RouterError`] when the chosen tier fails and either
    /// fallback is disabled or every fallback candidate is unavailable or fails.
    pub async fn generate_with_routing(
        &self,
        session: &SessionState,
        conversation: &[ConversationMessage],
        config: &GenerationConfig,
        sink: Option<Arc<dyn StreamSink>>,
    ) -> Result<Generation, RouterError> {
        let mut decision = self.route(conversation, &session.preferences, &session.availability);

        tracing::info!(
            tier = %decision.tier(),
            rule = decision.rule().as_str(),
            model = %decision.model(),
            reason = %decision.reason(),
            estimated_latency_ms = decision.estimated_latency_ms(),
            estimated_cost = decision.estimated_cost(),
            messages = conversation.len(),
            "Route decision made"
        );
        metrics::observe(
            &self.metrics,
            "record_decision",
            self.metrics.record_decision(decision.tier(), decision.rule()),
        );
        *self.last_decision.write().await = Some(decision.clone());

        let turn = Turn {
            conversation,
            config,
            sink: sink.as_ref(),
        };

        let generation =
            match observed_dispatch(&self.dispatcher, &self.metrics, &mut decision, &turn).await {
                Ok(response) => Generation { response, decision },
                Err(error) => {
                    FallbackOrchestrator::new(&self.dispatcher, &self.metrics)
                        .recover(
                            &decision,
                            error,
                            &session.preferences,
                            &session.availability,
                            &turn,
                        )
                        .await?
                }
            };

        *self.last_decision.write().await = Some(generation.decision.clone());
        Ok(generation)
    }

    /// Most recent decision, for display and telemetry
    ///
    /// Set when a turn is routed and replaced by the final (measured or
    /// fallback) decision when it completes.
    pub async fn last_decision(&self) -> Option<RoutingDecision> {
        self.last_decision.read().await.clone()
    }
}
