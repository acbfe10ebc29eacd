//! Tier selection policy
//!
//! Fast, deterministic routing over an ordered decision list.
//! Zero I/O - all decisions are pure CPU logic over the caller's
//! conversation, preferences and availability snapshot.
//!
//! Only the last message's content is inspected for content heuristics.

use super::{
    LatencyRequirement, PrivacyLevel, RoutingDecision, RoutingPreferences, RoutingRule, Tier,
};
use crate::models::{AvailabilityState, ConversationMessage, last_content};

/// Case-insensitive tokens marking a message as sensitive
pub const SENSITIVE_PATTERNS: [&str; 6] = [
    "password",
    "ssn",
    "credit card",
    "secret",
    "private",
    "confidential",
];

/// Messages shorter than this (in chars) qualify for the low-latency rule
pub const SHORT_MESSAGE_CHARS: usize = 500;
/// Messages longer than this (in chars) are routed as large context
pub const LONG_MESSAGE_CHARS: usize = 2000;
/// Conversations with more messages than this are routed as large context
pub const LONG_CONVERSATION_MESSAGES: usize = 10;
/// Cloud price per estimated token, in currency units
pub const CLOUD_COST_PER_TOKEN: f64 = 0.00002;

/// Default model identifier served by each tier
pub fn model_for(tier: Tier) -> &'static str {
    match tier {
        Tier::Browser => "Llama-3.2-3B-Instruct-q4f16_1",
        Tier::OnPremise => "llama-3.1-70b-instruct",
        Tier::Cloud => "gpt-4o",
    }
}

/// Static latency baseline for each tier, in milliseconds
pub fn latency_baseline_ms(tier: Tier) -> u64 {
    match tier {
        Tier::Browser => 100,
        Tier::OnPremise => 300,
        Tier::Cloud => 800,
    }
}

/// Estimate token count from text (simple heuristic: chars / 4)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Estimated cost of sending `text` to `tier`; zero for non-cloud tiers
pub fn estimate_cost(tier: Tier, text: &str) -> f64 {
    match tier {
        Tier::Cloud => estimate_tokens(text) as f64 * CLOUD_COST_PER_TOKEN,
        Tier::Browser | Tier::OnPremise => 0.0,
    }
}

/// Whether `text` contains any of [`SENSITIVE_PATTERNS`] (case-insensitive)
pub fn is_sensitive(text: &str) -> bool {
    let lowered = text.to_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lowered.contains(p))
}

/// Decision engine evaluating the routing policy
#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionEngine;

impl DecisionEngine {
    /// Create a new decision engine
    pub fn new() -> Self {
        Self
    }

    /// Choose a tier for the next turn
    ///
    /// # Routing Logic (first match wins)
    /// 1. Preferred tier set: that tier, regardless of availability
    /// 2. High privacy or sensitive content: Browser if ready, else OnPremise (never Cloud)
    /// 3. Low latency + Browser ready + short message: Browser
    /// 4. Cost optimization: Browser if ready, else OnPremise if reachable
    /// 5. Long message or long conversation: Cloud if reachable, else OnPremise if reachable
    /// 6. Default: OnPremise if reachable, else Browser if ready, else Cloud
    ///
    /// Rule 6 ends at Cloud even when it is not known to be reachable, so a
    /// decision is always produced.
    pub fn route(
        &self,
        conversation: &[ConversationMessage],
        preferences: &RoutingPreferences,
        availability: &AvailabilityState,
    ) -> RoutingDecision {
        let last = last_content(conversation);
        let (tier, rule, reason) =
            Self::evaluate_rules(conversation.len(), last, preferences, availability);
        Self::decision_for(tier, rule, reason, conversation)
    }

    /// Build a decision for `tier` with the fixed model and latency mapping
    pub fn decision_for(
        tier: Tier,
        rule: RoutingRule,
        reason: impl Into<String>,
        conversation: &[ConversationMessage],
    ) -> RoutingDecision {
        RoutingDecision::new(
            tier,
            model_for(tier),
            reason,
            rule,
            latency_baseline_ms(tier),
            estimate_cost(tier, last_content(conversation)),
        )
    }

    /// Evaluate the decision list
    ///
    /// Separated from `route` for testing.
    fn evaluate_rules(
        message_count: usize,
        last: &str,
        preferences: &RoutingPreferences,
        availability: &AvailabilityState,
    ) -> (Tier, RoutingRule, &'static str) {
        let browser_ready = availability.browser_ready;
        let on_premise = availability.on_premise_reachable;
        let cloud = availability.cloud_reachable;

        // Rule 1: explicit preference bypasses every heuristic
        if let Some(tier) = preferences.preferred_tier.forced() {
            return (tier, RoutingRule::UserPreference, "user preference");
        }

        // Rule 2: privacy. Cloud is never chosen here, even if nothing private is up
        if matches!(preferences.privacy_level, PrivacyLevel::High) || is_sensitive(last) {
            return if browser_ready {
                (Tier::Browser, RoutingRule::Privacy, "privacy: local model keeps data on device")
            } else if on_premise {
                (
                    Tier::OnPremise,
                    RoutingRule::Privacy,
                    "privacy: on-premise keeps data in the private network",
                )
            } else {
                (
                    Tier::OnPremise,
                    RoutingRule::Privacy,
                    "privacy: on-premise is unreachable but cloud is never used for private data",
                )
            };
        }

        let last_chars = last.chars().count();

        // Rule 3: short prompts go local when latency matters
        if matches!(preferences.latency_requirement, LatencyRequirement::Low)
            && browser_ready
            && last_chars < SHORT_MESSAGE_CHARS
        {
            return (Tier::Browser, RoutingRule::LowLatency, "low latency: short prompt on local model");
        }

        // Rule 4: zero marginal cost tiers, local first (no network hop)
        if preferences.cost_optimization {
            if browser_ready {
                return (
                    Tier::Browser,
                    RoutingRule::CostOptimization,
                    "cost optimization: local model has no marginal cost",
                );
            }
            if on_premise {
                return (
                    Tier::OnPremise,
                    RoutingRule::CostOptimization,
                    "cost optimization: on-premise has no marginal cost",
                );
            }
        }

        // Rule 5: large contexts benefit from the most capable model
        if last_chars > LONG_MESSAGE_CHARS || message_count > LONG_CONVERSATION_MESSAGES {
            if cloud {
                return (Tier::Cloud, RoutingRule::LargeContext, "large context: cloud model");
            }
            if on_premise {
                return (
                    Tier::OnPremise,
                    RoutingRule::LargeContext,
                    "large context: on-premise (cloud unreachable)",
                );
            }
        }

        // Rule 6: default chain, always yields a tier
        if on_premise {
            (Tier::OnPremise, RoutingRule::Default, "default: on-premise")
        } else if browser_ready {
            (Tier::Browser, RoutingRule::Default, "default: local model (on-premise unreachable)")
        } else {
            (Tier::Cloud, RoutingRule::Default, "default: cloud (final fallback)")
        }
    }
}
