//! Fallback orchestration
//!
//! When a dispatch fails, the remaining tiers are tried in a fixed order,
//! skipping the tier that just failed and any tier not known to be
//! available. The first success wins; otherwise the failure is terminal.
//!
//! An attempt that fails after streaming part of its output resets the
//! caller's sink, so the deltas a caller keeps always concatenate to the
//! response it finally receives.

use super::hybrid::{Generation, StreamSink};
use super::{DecisionEngine, RoutingDecision, RoutingPreferences, RoutingRule, Tier};
use crate::error::{DispatchError, RouterError};
use crate::metrics::{self, Metrics, Outcome};
use crate::models::{AvailabilityState, ConversationMessage, GenerationConfig};
use crate::shared::{DeltaCallback, Dispatcher, GenerationRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Order in which fallback candidates are tried
pub const FALLBACK_ORDER: [Tier; 3] = [Tier::OnPremise, Tier::Cloud, Tier::Browser];

/// Candidate tiers for recovering from a failure on one tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackPlan {
    failed: Tier,
    candidates: Vec<Tier>,
    unavailable: Vec<Tier>,
}

impl FallbackPlan {
    /// Split [`FALLBACK_ORDER`] minus `failed` into available and unavailable tiers
    pub fn new(failed: Tier, availability: &AvailabilityState) -> Self {
        let (candidates, unavailable): (Vec<Tier>, Vec<Tier>) = FALLBACK_ORDER
            .into_iter()
            .filter(|&tier| tier != failed)
            .partition(|&tier| availability.is_available(tier));
        Self {
            failed,
            candidates,
            unavailable,
        }
    }

    pub fn failed(&self) -> Tier {
        self.failed
    }

    /// Tiers to attempt, in order
    pub fn candidates(&self) -> &[Tier] {
        &self.candidates
    }

    /// Tiers skipped because their availability flag is false
    pub fn unavailable(&self) -> &[Tier] {
        &self.unavailable
    }
}

/// Inputs of one conversation turn, shared by every attempt
#[derive(Clone, Copy)]
pub struct Turn<'a> {
    pub conversation: &'a [ConversationMessage],
    pub config: &'a GenerationConfig,
    pub sink: Option<&'a Arc<dyn StreamSink>>,
}

/// Dispatch once, recording the attempt in metrics
///
/// Deltas go to the turn's sink. If the attempt fails after forwarding any,
/// the sink is reset before the error is returned.
pub(crate) async fn observed_dispatch(
    dispatcher: &Dispatcher,
    metrics: &Metrics,
    decision: &mut RoutingDecision,
    turn: &Turn<'_>,
) -> Result<String, DispatchError> {
    let tier = decision.tier();
    let forwarded = Arc::new(AtomicUsize::new(0));
    let on_delta: Option<Box<DeltaCallback>> = turn.sink.map(|sink| {
        let sink = Arc::clone(sink);
        let forwarded = Arc::clone(&forwarded);
        let on_delta: Box<DeltaCallback> = Box::new(move |delta: &str| {
            forwarded.fetch_add(1, Ordering::Relaxed);
            sink.delta(delta);
        });
        on_delta
    });
    let mut request = GenerationRequest::new(turn.conversation, turn.config);
    if let Some(on_delta) = on_delta.as_deref() {
        request = request.with_delta_callback(on_delta);
    }

    let started = Instant::now();
    let result = dispatcher.dispatch(decision, &request).await;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    let outcome = match &result {
        Ok(_) => Outcome::Success,
        Err(e) => {
            if e.is_stream_interruption() {
                metrics.mid_stream_failure(tier);
            }
            let discarded = forwarded.load(Ordering::Relaxed);
            if let Some(sink) = turn.sink.filter(|_| discarded > 0) {
                tracing::warn!(
                    tier = %tier,
                    discarded_deltas = discarded,
                    error = %e,
                    "Discarding partial output of failed attempt"
                );
                sink.reset();
            }
            Outcome::Failure
        }
    };
    metrics::observe(
        metrics,
        "record_generation",
        metrics.record_generation(tier, outcome, elapsed_ms),
    );
    result
}

/// Retries a failed generation on the remaining tiers
pub struct FallbackOrchestrator<'a> {
    dispatcher: &'a Dispatcher,
    metrics: &'a Metrics,
}

impl<'a> FallbackOrchestrator<'a> {
    pub fn new(dispatcher: &'a Dispatcher, metrics: &'a Metrics) -> Self {
        Self {
            dispatcher,
            metrics,
        }
    }

    /// Recover from `error`, raised by dispatching `failed`
    ///
    /// Candidates get a fresh decision with the standard model and latency
    /// mapping for their tier and the reason "fallback from {tier}". The sink
    /// only ever holds output of the attempt that is still running.
    ///
    /// # Errors
    ///
    /// - [`RouterError::FallbackDisabled`] when the preferences disable fallback
    /// - [`RouterError::AllTiersExhausted`] when every candidate was skipped or failed
    pub async fn recover(
        &self,
        failed: &RoutingDecision,
        error: DispatchError,
        preferences: &RoutingPreferences,
        availability: &AvailabilityState,
        turn: &Turn<'_>,
    ) -> Result<Generation, RouterError> {
        let original = failed.tier();

        if !preferences.fallback_enabled {
            tracing::warn!(
                tier = %original,
                error = %error,
                "Generation failed and fallback is disabled"
            );
            return Err(RouterError::FallbackDisabled {
                tier: original,
                source: error,
            });
        }

        let plan = FallbackPlan::new(original, availability);
        tracing::info!(
            failed_tier = %original,
            candidates = ?plan.candidates(),
            unavailable = ?plan.unavailable(),
            error = %error,
            "Attempting fallback"
        );

        let mut attempted = Vec::with_capacity(plan.candidates().len());
        let mut last_error = error.to_string();

        for &candidate in plan.candidates() {
            attempted.push(candidate);
            metrics::observe(
                self.metrics,
                "record_fallback",
                self.metrics.record_fallback(original, candidate),
            );

            let mut decision = DecisionEngine::decision_for(
                candidate,
                RoutingRule::Fallback,
                format!("fallback from {original}"),
                turn.conversation,
            );

            match observed_dispatch(self.dispatcher, self.metrics, &mut decision, turn).await {
                Ok(response) => {
                    tracing::info!(
                        failed_tier = %original,
                        tier = %candidate,
                        attempts = attempted.len(),
                        "Fallback succeeded"
                    );
                    return Ok(Generation { response, decision });
                }
                Err(e) => {
                    tracing::warn!(
                        failed_tier = %original,
                        tier = %candidate,
                        error = %e,
                        "Fallback candidate failed"
                    );
                    last_error = e.to_string();
                }
            }
        }

        tracing::error!(
            failed_tier = %original,
            attempted = ?attempted,
            unavailable = ?plan.unavailable(),
            last_error = %last_error,
            "All tiers exhausted"
        );

        Err(RouterError::AllTiersExhausted {
            original,
            attempted,
            unavailable: plan.unavailable().to_vec(),
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_excludes_failed_tier() {
        let plan = FallbackPlan::new(Tier::Cloud, &AvailabilityState::all_available());
        assert_eq!(plan.candidates(), &[Tier::OnPremise, Tier::Browser]);
        assert!(plan.unavailable().is_empty());
        assert_eq!(plan.failed(), Tier::Cloud);
    }

    #[test]
    fn test_plan_keeps_fixed_order() {
        let plan = FallbackPlan::new(Tier::Browser, &AvailabilityState::all_available());
        assert_eq!(plan.candidates(), &[Tier::OnPremise, Tier::Cloud]);

        let plan = FallbackPlan::new(Tier::OnPremise, &AvailabilityState::all_available());
        assert_eq!(plan.candidates(), &[Tier::Cloud, Tier::Browser]);
    }

    #[test]
    fn test_plan_skips_unavailable_tiers() {
        let availability = AvailabilityState::default().with_tier(Tier::Browser, true);
        let plan = FallbackPlan::new(Tier::Cloud, &availability);
        assert_eq!(plan.candidates(), &[Tier::Browser]);
        assert_eq!(plan.unavailable(), &[Tier::OnPremise]);
    }

    #[test]
    fn test_plan_with_nothing_available() {
        let plan = FallbackPlan::new(Tier::OnPremise, &AvailabilityState::default());
        assert!(plan.candidates().is_empty());
        assert_eq!(plan.unavailable(), &[Tier::Cloud, Tier::Browser]);
    }

    #[test]
    fn test_plan_never_contains_failed_tier() {
        for failed in Tier::ALL {
            let plan = FallbackPlan::new(failed, &AvailabilityState::all_available());
            assert!(!plan.candidates().contains(&failed));
            assert!(!plan.unavailable().contains(&failed));
            assert_eq!(plan.candidates().len() + plan.unavailable().len(), 2);
        }
    }
}
