//! Gateway selection
//!
//! Ranks the configured gateways by health into the ordered candidate list
//! the router walks through.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::{Config, GatewayConfig};
use crate::health::{GatewayHealth, GatewayHealthStore};

/// One gateway with its current health, as shown by `GET /health`
#[derive(Debug, Clone)]
pub struct GatewayStatus {
    pub gateway: GatewayConfig,
    pub health: GatewayHealth,
    pub healthy: bool,
}

/// Selects healthy gateways in preference order
///
/// Ordering is `(priority asc, lastSuccess desc, avgLatency asc)`: operator
/// intent first, then the gateway that most recently worked, then the faster
/// one.
#[derive(Debug)]
pub struct GatewaySelector {
    config: Arc<Config>,
    health: Arc<GatewayHealthStore>,
}

impl GatewaySelector {
    pub fn new(config: Arc<Config>, health: Arc<GatewayHealthStore>) -> Self {
        Self { config, health }
    }

    pub fn health_store(&self) -> &Arc<GatewayHealthStore> {
        &self.health
    }

    /// Number of configured gateways
    pub fn gateway_count(&self) -> usize {
        self.config.gateways.len()
    }

    /// Healthy gateways, best first; empty (never an error) when none are
    pub async fn list_healthy(&self, now_ms: i64) -> Vec<GatewayConfig> {
        let mut candidates: Vec<(GatewayConfig, GatewayHealth)> = Vec::new();
        for gateway in &self.config.gateways {
            let health = self.health.get(gateway.id()).await;
            if health.is_healthy(now_ms) {
                candidates.push((gateway.clone(), health));
            } else {
                tracing::debug!(
                    gateway_id = %gateway.id(),
                    cooldown_remaining_ms = health.cooldown_remaining_ms(now_ms),
                    consecutive_failures = health.consecutive_failures,
                    "Skipping gateway in cooldown"
                );
            }
        }

        candidates.sort_by(|a, b| rank(a, b));

        tracing::debug!(
            total_gateways = self.config.gateways.len(),
            healthy_gateways = candidates.len(),
            order = ?candidates.iter().map(|(g, _)| g.id()).collect::<Vec<_>>(),
            "Ranked healthy gateways"
        );

        candidates.into_iter().map(|(g, _)| g).collect()
    }

    /// Every configured gateway with its health, in configuration order
    pub async fn snapshot(&self, now_ms: i64) -> Vec<GatewayStatus> {
        let mut statuses = Vec::with_capacity(self.config.gateways.len());
        for gateway in &self.config.gateways {
            let health = self.health.get(gateway.id()).await;
            statuses.push(GatewayStatus {
                gateway: gateway.clone(),
                healthy: health.is_healthy(now_ms),
                health,
            });
        }
        statuses
    }
}

fn rank(a: &(GatewayConfig, GatewayHealth), b: &(GatewayConfig, GatewayHealth)) -> Ordering {
    let (ga, ha) = a;
    let (gb, hb) = b;
    ga.priority()
        .cmp(&gb.priority())
        .then_with(|| hb.last_success.cmp(&ha.last_success))
        .then_with(|| ha.avg_latency.total_cmp(&hb.avg_latency))
}
