//! Availability probing for inference tiers
//!
//! Combines the local runner's readiness with a single round trip to the
//! combined health endpoint, which reports on-premise and cloud reachability
//! together. The result is a cache: nothing refreshes it implicitly.

use crate::models::LocalModelRunner;
use crate::router::Tier;
use crate::shared::transport::HttpTransport;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Per-tier reachability snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AvailabilityState {
    pub browser_ready: bool,
    pub on_premise_reachable: bool,
    pub cloud_reachable: bool,
    /// Whether the last probe reached the health endpoint
    pub connected: bool,
}

impl AvailabilityState {
    /// Availability flag for a tier
    pub fn is_available(&self, tier: Tier) -> bool {
        match tier {
            Tier::Browser => self.browser_ready,
            Tier::OnPremise => self.on_premise_reachable,
            Tier::Cloud => self.cloud_reachable,
        }
    }

    /// Builder-style flag setter, mostly for fixtures
    pub fn with_tier(mut self, tier: Tier, available: bool) -> Self {
        match tier {
            Tier::Browser => self.browser_ready = available,
            Tier::OnPremise => self.on_premise_reachable = available,
            Tier::Cloud => self.cloud_reachable = available,
        }
        self
    }

    /// Everything available and connected
    pub fn all_available() -> Self {
        Self {
            browser_ready: true,
            on_premise_reachable: true,
            cloud_reachable: true,
            connected: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthReport {
    on_premise: TierHealth,
    cloud: TierHealth,
}

#[derive(Debug, Deserialize)]
struct TierHealth {
    healthy: bool,
}

/// Refreshes [`AvailabilityState`]
pub struct AvailabilityProbe {
    transport: Arc<dyn HttpTransport>,
    runner: Arc<dyn LocalModelRunner>,
    health_url: String,
    timeout: Duration,
}

impl AvailabilityProbe {
    /// Create a probe against `{health_base_url}/v1/health`
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        runner: Arc<dyn LocalModelRunner>,
        health_base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            runner,
            health_url: format!("{}/v1/health", health_base_url.trim_end_matches('/')),
            timeout,
        }
    }

    /// Get the health check URL
    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    /// Probe all tiers once
    ///
    /// Never fails. When the health endpoint cannot be read, `connected` is
    /// false and the remote flags keep their values from `last_known`.
    pub async fn probe(&self, last_known: &AvailabilityState) -> AvailabilityState {
        let mut state = *last_known;
        state.browser_ready = self.runner.is_ready();

        let outcome = tokio::time::timeout(self.timeout, self.transport.get_json(&self.health_url))
            .await
            .map_err(|_| format!("timed out after {}ms", self.timeout.as_millis()))
            .and_then(|result| result.map_err(|e| e.to_string()))
            .and_then(|body| {
                serde_json::from_value::<HealthReport>(body)
                    .map_err(|e| format!("unexpected health report: {e}"))
            });

        match outcome {
            Ok(report) => {
                state.on_premise_reachable = report.on_premise.healthy;
                state.cloud_reachable = report.cloud.healthy;
                state.connected = true;
                tracing::debug!(
                    url = %self.health_url,
                    browser_ready = state.browser_ready,
                    on_premise = state.on_premise_reachable,
                    cloud = state.cloud_reachable,
                    "Availability probe completed"
                );
            }
            Err(reason) => {
                state.connected = false;
                tracing::warn!(
                    url = %self.health_url,
                    reason = %reason,
                    on_premise = state.on_premise_reachable,
                    cloud = state.cloud_reachable,
                    "Availability probe failed, keeping last known tier flags"
                );
            }
        }

        state
    }
}
