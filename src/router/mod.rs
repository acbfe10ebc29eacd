//! Routing logic for hybridroute
//!
//! Decides, per conversation turn, which inference tier (local, on-premise
//! or cloud) should serve a generation, and recovers from tier failures.

pub mod decision;
pub mod fallback;
pub mod hybrid;

pub use decision::DecisionEngine;
pub use fallback::{FALLBACK_ORDER, FallbackOrchestrator, FallbackPlan, Turn};
pub use hybrid::{Generation, InferenceRouter, StreamSink};

use crate::models::AvailabilityState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inference execution context a request can be dispatched to
///
/// There is deliberately no `Auto` variant here: a dispatch target is always
/// concrete. User-facing "let the policy decide" lives in [`PreferredTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Model running on the client's own compute
    Browser,
    /// Self-hosted model cluster behind an HTTP chat-completion API
    OnPremise,
    /// Managed cloud LLM provider behind an HTTP chat-completion API
    Cloud,
}

impl Tier {
    /// All dispatchable tiers
    pub const ALL: [Tier; 3] = [Tier::Browser, Tier::OnPremise, Tier::Cloud];

    /// Convert to string representation for logging, metrics and the wire `tier` tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::OnPremise => "on_premise",
            Self::Cloud => "cloud",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PreferredTier {
    #[default]
    Auto,
    Browser,
    OnPremise,
    Cloud,
}

impl PreferredTier {
    /// The forced tier, or `None` when the policy should decide
    pub fn forced(&self) -> Option<Tier> {
        match self {
            Self::Auto => None,
            Self::Browser => Some(Tier::Browser),
            Self::OnPremise => Some(Tier::OnPremise),
            Self::Cloud => Some(Tier::Cloud),
        }
    }
}

impl From<Tier> for PreferredTier {
    fn from(tier: Tier) -> Self {
        match tier {
            Tier::Browser => Self::Browser,
            Tier::OnPremise => Self::OnPremise,
            Tier::Cloud => Self::Cloud,
        }
    }
}

/// How sensitive the user considers the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// How much round-trip latency the user tolerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LatencyRequirement {
    Low,
    #[default]
    Medium,
    High,
}

/// Session-scoped routing preferences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingPreferences {
    pub preferred_tier: PreferredTier,
    pub privacy_level: PrivacyLevel,
    pub latency_requirement: LatencyRequirement,
    pub cost_optimization: bool,
    pub fallback_enabled: bool,
}

impl Default for RoutingPreferences {
    fn default() -> Self {
        Self {
            preferred_tier: PreferredTier::Auto,
            privacy_level: PrivacyLevel::Medium,
            latency_requirement: LatencyRequirement::Medium,
            cost_optimization: false,
            fallback_enabled: true,
        }
    }
}

impl RoutingPreferences {
    /// Force a specific tier
    pub fn with_preferred_tier(mut self, preferred_tier: PreferredTier) -> Self {
        self.preferred_tier = preferred_tier;
        self
    }

    /// Set the privacy level
    pub fn with_privacy_level(mut self, privacy_level: PrivacyLevel) -> Self {
        self.privacy_level = privacy_level;
        self
    }

    /// Set the latency requirement
    pub fn with_latency_requirement(mut self, latency_requirement: LatencyRequirement) -> Self {
        self.latency_requirement = latency_requirement;
        self
    }

    /// Enable or disable cost optimization
    pub fn with_cost_optimization(mut self, enabled: bool) -> Self {
        self.cost_optimization = enabled;
        self
    }

    /// Enable or disable fallback to other tiers on failure
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }
}

/// Which rule of the decision list produced a decision
///
/// Provides type-safe labels for metrics and logs instead of raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingRule {
    UserPreference,
    Privacy,
    LowLatency,
    CostOptimization,
    LargeContext,
    Default,
    Fallback,
}

impl RoutingRule {
    /// Convert to string representation for logging and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserPreference => "user_preference",
            Self::Privacy => "privacy",
            Self::LowLatency => "low_latency",
            Self::CostOptimization => "cost_optimization",
            Self::LargeContext => "large_context",
            Self::Default => "default",
            Self::Fallback => "fallback",
        }
    }
}

/// Result of a routing decision
///
/// Fields are private so the tier/cost invariant (cost is zero unless the
/// tier is Cloud) cannot be broken after construction. The only mutation is
/// replacing the latency estimate with a measured value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    tier: Tier,
    model: String,
    reason: String,
    rule: RoutingRule,
    estimated_latency_ms: u64,
    estimated_cost: f64,
}

impl RoutingDecision {
    /// Create a decision, clamping cost to zero for non-cloud tiers
    pub fn new(
        tier: Tier,
        model: impl Into<String>,
        reason: impl Into<String>,
        rule: RoutingRule,
        estimated_latency_ms: u64,
        estimated_cost: f64,
    ) -> Self {
        let estimated_cost = match tier {
            Tier::Cloud if estimated_cost.is_finite() => estimated_cost.max(0.0),
            _ => 0.0,
        };
        Self {
            tier,
            model: model.into(),
            reason: reason.into(),
            rule,
            estimated_latency_ms,
            estimated_cost,
        }
    }

    /// Which tier to dispatch to
    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Model identifier for the chosen tier
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Human-readable justification
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Which rule produced the decision
    pub fn rule(&self) -> RoutingRule {
        self.rule
    }

    /// Estimated (or, after generation, measured) latency in milliseconds
    pub fn estimated_latency_ms(&self) -> u64 {
        self.estimated_latency_ms
    }

    /// Estimated cost in currency units
    pub fn estimated_cost(&self) -> f64 {
        self.estimated_cost
    }

    /// Replace the latency estimate with the measured duration
    pub fn record_latency(&mut self, measured_ms: u64) {
        self.estimated_latency_ms = measured_ms;
    }
}

/// Caller-owned session state passed into the router on every turn
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub preferences: RoutingPreferences,
    pub availability: AvailabilityState,
}

impl SessionState {
    /// Create a session with the given preferences and nothing known to be available
    pub fn new(preferences: RoutingPreferences) -> Self {
        Self {
            preferences,
            availability: AvailabilityState::default(),
        }
    }
}
