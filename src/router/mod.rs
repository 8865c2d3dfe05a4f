//! Health-tracked failover routing
//!
//! For each request the router asks the [`GatewaySelector`] for the healthy
//! candidates and walks them in order, one at a time. Every attempt outcome
//! is written back to the health store before the next attempt starts, so a
//! request never penalizes the same gateway twice for one failure.
//!
//! When no gateway is healthy at entry, all health is reset and the request
//! is declined with [`RouteFailure::AllGatewaysExhausted`]. The next request
//! then sees every gateway as healthy again. This trades one failed request
//! for guaranteed recovery when gateways were marked unhealthy by mistake;
//! against a genuinely dead upstream it lets every caller retry at once,
//! which `routing.backoff_jitter` can soften.

mod policy;

pub use policy::{AttemptOutcome, CooldownPolicy};

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::clock::SharedClock;
use crate::config::{Config, GatewayConfig};
use crate::health::{GatewayHealthStore, HealthPatch};
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use crate::selector::GatewaySelector;
use crate::upstream::{UpstreamBody, UpstreamClient, UpstreamError};

/// Maximum characters of an upstream error body kept in failure messages
const ERROR_EXCERPT_CHARS: usize = 200;

/// Per-request routing options
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteOptions {
    pub stream: bool,
}

/// A successful upstream reply plus routing metadata
#[derive(Debug)]
pub struct RoutedResponse {
    pub gateway: GatewayConfig,
    /// 1-based count of attempts made, including the successful one
    pub attempts: usize,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

/// Why a request could not be served
#[derive(Error, Debug)]
pub enum RouteFailure {
    /// Nothing was healthy; health has been reset and the caller may retry now
    #[error("All gateways were in cooldown; gateway health has been reset, retry the request")]
    AllGatewaysExhausted,

    #[error("All {attempts} attempted gateway(s) failed and are in cooldown. Last error: {last_error}")]
    AttemptsExhausted { attempts: usize, last_error: String },
}

impl RouteFailure {
    pub fn attempts(&self) -> usize {
        match self {
            Self::AllGatewaysExhausted => 0,
            Self::AttemptsExhausted { attempts, .. } => *attempts,
        }
    }

    pub fn all_gateways_exhausted(&self) -> bool {
        matches!(self, Self::AllGatewaysExhausted)
    }

    /// Error `type` reported to the caller
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::AllGatewaysExhausted => "all_gateways_exhausted",
            Self::AttemptsExhausted { .. } => "router_error",
        }
    }
}

/// Sequential failover router
#[derive(Debug)]
pub struct RequestRouter {
    config: Arc<Config>,
    selector: Arc<GatewaySelector>,
    health: Arc<GatewayHealthStore>,
    upstream: UpstreamClient,
    clock: SharedClock,
    metrics: Arc<Metrics>,
    policy: CooldownPolicy,
}

impl RequestRouter {
    pub fn new(
        config: Arc<Config>,
        selector: Arc<GatewaySelector>,
        upstream: UpstreamClient,
        clock: SharedClock,
        metrics: Arc<Metrics>,
    ) -> Self {
        let policy = CooldownPolicy::from_config(&config.routing);
        let health = selector.health_store().clone();
        Self {
            config,
            selector,
            health,
            upstream,
            clock,
            metrics,
            policy,
        }
    }

    /// Route `payload` to the best healthy gateway, failing over in order
    pub async fn route(
        &self,
        payload: &serde_json::Value,
        options: RouteOptions,
        request_id: RequestId,
    ) -> Result<RoutedResponse, RouteFailure> {
        let candidates = self.selector.list_healthy(self.clock.now_ms()).await;

        if candidates.is_empty() {
            self.emergency_reset(request_id).await;
            return Err(RouteFailure::AllGatewaysExhausted);
        }

        let max_retries = self.config.routing.max_retries;
        let mut attempts = 0;
        let mut last_error = String::new();

        for gateway in candidates.into_iter().take(max_retries) {
            attempts += 1;

            tracing::debug!(
                request_id = %request_id,
                gateway_id = %gateway.id(),
                attempt = attempts,
                max_retries = max_retries,
                stream = options.stream,
                "Attempting upstream gateway"
            );

            let started = Instant::now();
            let result = self.upstream.send(&gateway, payload, options.stream).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(reply) => {
                    let outcome = AttemptOutcome::from_status(reply.status);
                    self.record_attempt(&gateway, outcome);

                    if outcome == AttemptOutcome::Success {
                        self.mark_success(&gateway, elapsed_ms).await;

                        tracing::info!(
                            request_id = %request_id,
                            gateway_id = %gateway.id(),
                            status = %reply.status,
                            attempt = attempts,
                            elapsed_ms = elapsed_ms,
                            "Upstream request succeeded"
                        );

                        return Ok(RoutedResponse {
                            gateway,
                            attempts,
                            status: reply.status,
                            headers: reply.headers,
                            body: reply.body,
                        });
                    }

                    last_error = format!(
                        "{} returned HTTP {}: {}",
                        gateway.id(),
                        reply.status.as_u16(),
                        reply.body_excerpt(ERROR_EXCERPT_CHARS)
                    );

                    tracing::warn!(
                        request_id = %request_id,
                        gateway_id = %gateway.id(),
                        status = %reply.status,
                        outcome = outcome.as_str(),
                        attempt = attempts,
                        elapsed_ms = elapsed_ms,
                        "Upstream returned non-success status"
                    );

                    self.mark_failure(&gateway, outcome).await;
                }
                Err(e) => {
                    self.record_attempt(&gateway, AttemptOutcome::TransportError);

                    tracing::warn!(
                        request_id = %request_id,
                        gateway_id = %gateway.id(),
                        error = %e,
                        attempt = attempts,
                        elapsed_ms = elapsed_ms,
                        "Upstream transport failure"
                    );

                    last_error = e.to_string();
                    self.mark_transport_failure(&gateway, &e).await;
                }
            }
        }

        tracing::error!(
            request_id = %request_id,
            attempts = attempts,
            last_error = %last_error,
            "All attempted gateways failed"
        );

        Err(RouteFailure::AttemptsExhausted {
            attempts,
            last_error,
        })
    }

    /// Reset every configured gateway to default health
    pub async fn reset_all(&self) {
        self.health
            .reset_all(self.config.gateways.iter().map(GatewayConfig::id))
            .await;
    }

    async fn emergency_reset(&self, request_id: RequestId) {
        tracing::warn!(
            request_id = %request_id,
            total_gateways = self.config.gateways.len(),
            "No healthy gateways available; resetting all gateway health and declining request"
        );
        self.metrics.emergency_reset();
        self.reset_all().await;
    }

    async fn mark_success(&self, gateway: &GatewayConfig, elapsed_ms: f64) {
        let now = self.clock.now_ms();
        let current = self.health.get(gateway.id()).await;

        let updated = self
            .health
            .update(
                gateway.id(),
                HealthPatch {
                    last_success: Some(now),
                    consecutive_failures: Some(0),
                    cooldown_until: Some(0),
                    avg_latency: Some(current.next_avg_latency(elapsed_ms)),
                    request_count: Some(current.request_count.saturating_add(1)),
                    ..Default::default()
                },
            )
            .await;

        if current.consecutive_failures > 0 {
            tracing::info!(
                gateway_id = %gateway.id(),
                previous_failures = current.consecutive_failures,
                "Gateway recovered"
            );
        }

        if let Err(e) = self.metrics.record_latency(gateway.id(), elapsed_ms) {
            tracing::warn!(gateway_id = %gateway.id(), error = %e, "Metrics recording failed (non-fatal)");
        }

        tracing::debug!(
            gateway_id = %gateway.id(),
            avg_latency_ms = updated.avg_latency,
            request_count = updated.request_count,
            "Recorded gateway success"
        );
    }

    async fn mark_transport_failure(&self, gateway: &GatewayConfig, error: &UpstreamError) {
        tracing::debug!(gateway_id = %gateway.id(), error = %error, "Penalizing gateway for transport failure");
        self.mark_failure(gateway, AttemptOutcome::TransportError).await;
    }

    /// Apply the cooldown for `outcome`; outcomes that do not penalize leave health untouched
    async fn mark_failure(&self, gateway: &GatewayConfig, outcome: AttemptOutcome) {
        if !outcome.penalizes() {
            tracing::debug!(
                gateway_id = %gateway.id(),
                outcome = outcome.as_str(),
                "Outcome does not affect gateway health"
            );
            return;
        }

        let current = self.health.get(gateway.id()).await;
        let failures = current.consecutive_failures.saturating_add(1);
        let Some(cooldown_ms) = self.policy.cooldown_ms(outcome, failures) else {
            return;
        };

        let now = self.clock.now_ms();
        let cooldown_until = now.saturating_add(i64::try_from(cooldown_ms).unwrap_or(i64::MAX));

        self.health
            .update(
                gateway.id(),
                HealthPatch {
                    last_failure: Some(now),
                    consecutive_failures: Some(failures),
                    cooldown_until: Some(cooldown_until),
                    ..Default::default()
                },
            )
            .await;

        tracing::warn!(
            gateway_id = %gateway.id(),
            outcome = outcome.as_str(),
            consecutive_failures = failures,
            cooldown_ms = cooldown_ms,
            "Gateway placed in cooldown"
        );
    }

    fn record_attempt(&self, gateway: &GatewayConfig, outcome: AttemptOutcome) {
        if let Err(e) = self.metrics.record_attempt(gateway.id(), outcome.as_str()) {
            tracing::warn!(gateway_id = %gateway.id(), error = %e, "Metrics recording failed (non-fatal)");
        }
    }
}
