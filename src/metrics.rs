//! Prometheus metrics collection for hybridroute
//!
//! This module provides metrics instrumentation for tracking:
//! - Routing decisions by tier and rule
//! - Generations by tier and outcome, with duration
//! - Fallback attempts between tiers
//! - Availability probe outcomes
//!
//! Metrics are exposed via the `/metrics` endpoint in Prometheus text format.
//! All labels come from closed enums, so cardinality is bounded.

use crate::router::{RoutingRule, Tier};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Outcome label for generations and probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    /// Convert outcome to Prometheus label string
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

/// Metrics collector for hybridroute
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    decisions_total: IntCounterVec,
    generations_total: IntCounterVec,
    generation_duration: HistogramVec,
    fallback_attempts: IntCounterVec,
    probes_total: IntCounterVec,
    mid_stream_failures: IntCounterVec,
    metrics_recording_failures: IntCounterVec,
}

impl Metrics {
    /// Create a new Metrics instance
    ///
    /// Registers all metrics with a new Prometheus registry.
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        // Cardinality: 3 tiers x 7 rules
        let decisions_total = IntCounterVec::new(
            Opts::new(
                "hybridroute_decisions_total",
                "Total routing decisions by chosen tier and deciding rule",
            ),
            &["tier", "rule"],
        )?;

        let generations_total = IntCounterVec::new(
            Opts::new(
                "hybridroute_generations_total",
                "Total dispatch attempts by tier and outcome",
            ),
            &["tier", "outcome"],
        )?;

        let generation_duration = HistogramVec::new(
            HistogramOpts::new(
                "hybridroute_generation_duration_ms",
                "Wall-clock duration of successful generations in milliseconds",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["tier"],
        )?;

        let fallback_attempts = IntCounterVec::new(
            Opts::new(
                "hybridroute_fallback_attempts_total",
                "Total fallback attempts by failed tier and candidate tier",
            ),
            &["from", "to"],
        )?;

        let probes_total = IntCounterVec::new(
            Opts::new(
                "hybridroute_availability_probes_total",
                "Total availability probes by outcome (failure = health endpoint unreachable)",
            ),
            &["outcome"],
        )?;

        // Interrupted streams still count as generation failures; this
        // isolates them so flaky connections stand out from hard errors
        let mid_stream_failures = IntCounterVec::new(
            Opts::new(
                "hybridroute_mid_stream_failures_total",
                "Total streamed generations interrupted after the stream started, by tier",
            ),
            &["tier"],
        )?;

        let metrics_recording_failures = IntCounterVec::new(
            Opts::new(
                "hybridroute_metrics_recording_failures_total",
                "Total number of metrics recording operation failures by operation. \
                Indicates Prometheus internal errors - frequent failures require investigation.",
            ),
            &["operation"],
        )?;

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(generations_total.clone()))?;
        registry.register(Box::new(generation_duration.clone()))?;
        registry.register(Box::new(fallback_attempts.clone()))?;
        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(mid_stream_failures.clone()))?;
        registry.register(Box::new(metrics_recording_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            decisions_total,
            generations_total,
            generation_duration,
            fallback_attempts,
            probes_total,
            mid_stream_failures,
            metrics_recording_failures,
        })
    }

    /// Record a routing decision
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered.
    pub fn record_decision(&self, tier: Tier, rule: RoutingRule) -> Result<(), prometheus::Error> {
        self.decisions_total
            .get_metric_with_label_values(&[tier.as_str(), rule.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a dispatch attempt and, on success, its duration
    ///
    /// # Errors
    ///
    /// Returns an error if the metric is not registered or `duration_ms` is
    /// NaN, infinite or negative. NaN and infinity corrupt histogram
    /// percentiles, so they are rejected instead of observed.
    pub fn record_generation(
        &self,
        tier: Tier,
        outcome: Outcome,
        duration_ms: f64,
    ) -> Result<(), prometheus::Error> {
        if !duration_ms.is_finite() || duration_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "Histogram value must be finite and non-negative, got: {duration_ms}"
            )));
        }

        self.generations_total
            .get_metric_with_label_values(&[tier.as_str(), outcome.as_str()])?
            .inc();
        if outcome == Outcome::Success {
            self.generation_duration
                .get_metric_with_label_values(&[tier.as_str()])?
                .observe(duration_ms);
        }
        Ok(())
    }

    /// Record one fallback attempt from a failed tier to a candidate
    pub fn record_fallback(&self, from: Tier, to: Tier) -> Result<(), prometheus::Error> {
        self.fallback_attempts
            .get_metric_with_label_values(&[from.as_str(), to.as_str()])?
            .inc();
        Ok(())
    }

    /// Record an availability probe
    pub fn record_probe(&self, outcome: Outcome) -> Result<(), prometheus::Error> {
        self.probes_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record a streamed generation interrupted after it started
    pub fn mid_stream_failure(&self, tier: Tier) {
        self.mid_stream_failures
            .with_label_values(&[tier.as_str()])
            .inc();
    }

    /// Record a metrics recording operation failure
    ///
    /// `operation` names the failed call, e.g. "record_decision".
    pub fn metrics_recording_failure(&self, operation: &str) {
        self.metrics_recording_failures
            .with_label_values(&[operation])
            .inc();
    }

    /// Get the current count of metrics recording failures across all operations
    ///
    /// Used by the /health endpoint to report metrics system status.
    pub fn metrics_recording_failures_count(&self) -> u64 {
        self.counter_total("hybridroute_metrics_recording_failures_total")
    }

    /// Sum of a counter family across all label combinations
    fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.name() == name)
            .map(|mf| {
                mf.get_metric()
                    .iter()
                    .map(|m| m.counter.value.unwrap_or(0.0) as u64)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                prometheus::Error::Msg(format!(
                    "Failed to encode {metric_count} metric families: {e}"
                ))
            })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            tracing::error!(
                invalid_byte_index = valid_up_to,
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {valid_up_to}: {e}"
            ))
        })
    }
}

/// Apply a recording result, logging and counting failures instead of propagating
///
/// Metrics are never allowed to fail a request.
pub fn observe(metrics: &Metrics, operation: &str, result: Result<(), prometheus::Error>) {
    if let Err(e) = result {
        metrics.metrics_recording_failure(operation);
        tracing::error!(
            error = %e,
            operation = operation,
            "Metrics recording failed. Observability degraded but request continues."
        );
    }
}
