//! Prometheus metrics collection for Switchyard
//!
//! Tracks:
//! - Routed requests by final outcome
//! - Per-gateway attempt outcomes and upstream latency
//! - Emergency resets (every gateway was in cooldown)
//! - Swallowed persistence failures
//! - Heartbeats and incidents received
//!
//! Exposed via `GET /metrics` in Prometheus text format. Recording failures
//! are returned to the caller, which logs them and carries on: metrics must
//! never break a request.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Final outcome of a routed chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    AllGatewaysExhausted,
    AttemptsExhausted,
    InvalidRequest,
}

impl RequestOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestOutcome::Success => "success",
            RequestOutcome::AllGatewaysExhausted => "all_gateways_exhausted",
            RequestOutcome::AttemptsExhausted => "attempts_exhausted",
            RequestOutcome::InvalidRequest => "invalid_request",
        }
    }
}

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    pub registry: Arc<Registry>,
    requests_total: IntCounterVec,
    gateway_attempts: IntCounterVec,
    upstream_latency: HistogramVec,
    emergency_resets: IntCounter,
    persistence_failures: IntCounterVec,
    heartbeats: IntCounter,
    incidents: IntCounter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create a new Metrics instance with its own registry
    ///
    /// # Errors
    ///
    /// Returns an error if metric registration fails (e.g., duplicate names).
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new(
                "switchyard_requests_total",
                "Total chat completion requests by final outcome",
            ),
            &["outcome"],
        )?;

        // Cardinality: N gateways x 7 attempt outcomes
        let gateway_attempts = IntCounterVec::new(
            Opts::new(
                "switchyard_gateway_attempts_total",
                "Upstream attempts by gateway and classified outcome",
            ),
            &["gateway", "outcome"],
        )?;

        let upstream_latency = HistogramVec::new(
            HistogramOpts::new(
                "switchyard_upstream_latency_ms",
                "Time to upstream response headers in milliseconds (successful attempts)",
            )
            .buckets(vec![
                50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
            ]),
            &["gateway"],
        )?;

        let emergency_resets = IntCounter::with_opts(Opts::new(
            "switchyard_emergency_resets_total",
            "Times every gateway was found in cooldown and all health was reset",
        ))?;

        let persistence_failures = IntCounterVec::new(
            Opts::new(
                "switchyard_persistence_failures_total",
                "State store writes that failed and were swallowed, by record kind",
            ),
            &["record"],
        )?;

        let heartbeats = IntCounter::with_opts(Opts::new(
            "switchyard_heartbeats_total",
            "Heartbeats received from the primary agent",
        ))?;

        let incidents = IntCounter::with_opts(Opts::new(
            "switchyard_incidents_total",
            "Incidents recorded in the ledger",
        ))?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(gateway_attempts.clone()))?;
        registry.register(Box::new(upstream_latency.clone()))?;
        registry.register(Box::new(emergency_resets.clone()))?;
        registry.register(Box::new(persistence_failures.clone()))?;
        registry.register(Box::new(heartbeats.clone()))?;
        registry.register(Box::new(incidents.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            requests_total,
            gateway_attempts,
            upstream_latency,
            emergency_resets,
            persistence_failures,
            heartbeats,
            incidents,
        })
    }

    pub fn record_request(&self, outcome: RequestOutcome) -> Result<(), prometheus::Error> {
        self.requests_total
            .get_metric_with_label_values(&[outcome.as_str()])?
            .inc();
        Ok(())
    }

    /// Record one upstream attempt
    ///
    /// `outcome` comes from `AttemptOutcome::as_str`, a closed set.
    pub fn record_attempt(&self, gateway: &str, outcome: &str) -> Result<(), prometheus::Error> {
        self.gateway_attempts
            .get_metric_with_label_values(&[gateway, outcome])?
            .inc();
        Ok(())
    }

    /// Record upstream latency for a successful attempt
    ///
    /// # Errors
    ///
    /// Rejects NaN, infinite, or negative durations.
    pub fn record_latency(&self, gateway: &str, latency_ms: f64) -> Result<(), prometheus::Error> {
        if !latency_ms.is_finite() || latency_ms < 0.0 {
            return Err(prometheus::Error::Msg(format!(
                "invalid latency {} for gateway {}",
                latency_ms, gateway
            )));
        }
        self.upstream_latency
            .get_metric_with_label_values(&[gateway])?
            .observe(latency_ms);
        Ok(())
    }

    pub fn emergency_reset(&self) {
        self.emergency_resets.inc();
    }

    pub fn emergency_resets_count(&self) -> u64 {
        self.emergency_resets.get()
    }

    /// Count a swallowed state store failure (`record` is a fixed kind label)
    pub fn persistence_failure(&self, record: &'static str) {
        match self.persistence_failures.get_metric_with_label_values(&[record]) {
            Ok(counter) => counter.inc(),
            Err(e) => {
                tracing::warn!(error = %e, record = record, "Failed to record persistence failure metric")
            }
        }
    }

    /// Total swallowed persistence failures across all record kinds
    pub fn persistence_failures_count(&self) -> u64 {
        ["gateway_health", "liveness_state"]
            .iter()
            .filter_map(|r| self.persistence_failures.get_metric_with_label_values(&[*r]).ok())
            .map(|c| c.get())
            .sum()
    }

    pub fn heartbeat(&self) {
        self.heartbeats.inc();
    }

    pub fn incident(&self) {
        self.incidents.inc();
    }

    /// Encode all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            tracing::error!(
                error = %e,
                metric_family_count = metric_families.len(),
                "Prometheus text encoder failed"
            );
            e
        })?;

        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Metrics output is not valid UTF-8: {}", e))
        })
    }
}
