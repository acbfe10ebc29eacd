//! Tier dispatch
//!
//! Executes one generation against the tier named by a routing decision.
//! Remote tiers go through the chat-completion client; the Browser tier goes
//! to the local model runner. Every attempt is bounded by the tier's timeout,
//! and a successful attempt overwrites the decision's latency estimate with
//! the measured wall-clock duration.

use crate::config::{Config, EndpointsConfig};
use crate::error::DispatchError;
use crate::models::{ConversationMessage, GenerationConfig, LocalModelRunner};
use crate::router::{RoutingDecision, Tier};
use crate::shared::completions::{ChatCompletionClient, DeltaCallback};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Per-tier dispatch timeouts, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    browser: u64,
    on_premise: u64,
    cloud: u64,
}

impl TierTimeouts {
    pub fn new(browser: u64, on_premise: u64, cloud: u64) -> Self {
        Self {
            browser,
            on_premise,
            cloud,
        }
    }

    /// Same timeout for every tier
    pub fn uniform(seconds: u64) -> Self {
        Self::new(seconds, seconds, seconds)
    }

    /// Resolve per-tier overrides against the global request timeout
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.timeout_for_tier(Tier::Browser),
            config.timeout_for_tier(Tier::OnPremise),
            config.timeout_for_tier(Tier::Cloud),
        )
    }

    pub fn for_tier(&self, tier: Tier) -> u64 {
        match tier {
            Tier::Browser => self.browser,
            Tier::OnPremise => self.on_premise,
            Tier::Cloud => self.cloud,
        }
    }
}

/// Everything one generation needs besides the target tier
#[derive(Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub conversation: &'a [ConversationMessage],
    pub config: &'a GenerationConfig,
    pub on_delta: Option<&'a DeltaCallback>,
}

impl<'a> GenerationRequest<'a> {
    pub fn new(conversation: &'a [ConversationMessage], config: &'a GenerationConfig) -> Self {
        Self {
            conversation,
            config,
            on_delta: None,
        }
    }

    pub fn with_delta_callback(mut self, on_delta: &'a DeltaCallback) -> Self {
        self.on_delta = Some(on_delta);
        self
    }
}

/// Sends generations to the tier a decision names
pub struct Dispatcher {
    client: ChatCompletionClient,
    runner: Arc<dyn LocalModelRunner>,
    endpoints: EndpointsConfig,
    timeouts: TierTimeouts,
}

impl Dispatcher {
    pub fn new(
        client: ChatCompletionClient,
        runner: Arc<dyn LocalModelRunner>,
        endpoints: EndpointsConfig,
        timeouts: TierTimeouts,
    ) -> Self {
        Self {
            client,
            runner,
            endpoints,
            timeouts,
        }
    }

    /// Get the local model runner
    pub fn runner(&self) -> &Arc<dyn LocalModelRunner> {
        &self.runner
    }

    pub fn timeouts(&self) -> TierTimeouts {
        self.timeouts
    }

    /// Run one generation on `decision.tier()`
    ///
    /// On success the decision's latency is replaced with the measured
    /// duration. On failure the decision is left untouched.
    pub async fn dispatch(
        &self,
        decision: &mut RoutingDecision,
        request: &GenerationRequest<'_>,
    ) -> Result<String, DispatchError> {
        let tier = decision.tier();
        let timeout_seconds = self.timeouts.for_tier(tier);
        let started = Instant::now();

        tracing::debug!(
            tier = %tier,
            model = %decision.model(),
            timeout_seconds = timeout_seconds,
            stream = request.config.stream,
            "Dispatching generation"
        );

        let attempt = async {
            match tier {
                Tier::Browser => self
                    .runner
                    .generate(request.conversation, request.config, request.on_delta)
                    .await
                    .map_err(DispatchError::from),
                Tier::OnPremise => self.remote(self.endpoints.on_premise(), tier, request).await,
                Tier::Cloud => self.remote(self.endpoints.cloud(), tier, request).await,
            }
        };

        let response = match tokio::time::timeout(Duration::from_secs(timeout_seconds), attempt)
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(
                    tier = %tier,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Tier dispatch failed"
                );
                return Err(e);
            }
            Err(_elapsed) => {
                tracing::warn!(
                    tier = %tier,
                    timeout_seconds = timeout_seconds,
                    "Tier dispatch timed out"
                );
                return Err(DispatchError::Timeout {
                    tier,
                    timeout_seconds,
                });
            }
        };

        let measured_ms = started.elapsed().as_millis() as u64;
        decision.record_latency(measured_ms);

        tracing::info!(
            tier = %tier,
            model = %decision.model(),
            latency_ms = measured_ms,
            response_length = response.len(),
            "Generation completed"
        );

        Ok(response)
    }

    async fn remote(
        &self,
        base_url: &str,
        tier: Tier,
        request: &GenerationRequest<'_>,
    ) -> Result<String, DispatchError> {
        self.client
            .complete(
                base_url,
                tier,
                request.conversation,
                request.config,
                request.on_delta,
            )
            .await
            .map_err(|source| DispatchError::Remote { tier, source })
    }
}
