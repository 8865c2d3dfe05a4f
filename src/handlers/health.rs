//! Gateway health endpoints
//!
//! `GET /health` reports every gateway's health record and the
//! healthy/total counts; `POST /reset` forces every record back to default.

use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

use crate::handlers::AppState;
use crate::selector::GatewayStatus;

/// Per-gateway entry of the health snapshot
#[derive(Debug, Serialize)]
pub struct GatewayHealthView {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub cooldown_until: i64,
    pub cooldown_remaining_ms: i64,
    pub last_success: i64,
    pub last_failure: i64,
    pub avg_latency: f64,
    pub request_count: u64,
}

impl GatewayHealthView {
    fn from_status(status: GatewayStatus, now_ms: i64) -> Self {
        Self {
            id: status.gateway.id().to_string(),
            name: status.gateway.name().to_string(),
            priority: status.gateway.priority(),
            healthy: status.healthy,
            consecutive_failures: status.health.consecutive_failures,
            cooldown_until: status.health.cooldown_until,
            cooldown_remaining_ms: status.health.cooldown_remaining_ms(now_ms),
            last_success: status.health.last_success,
            last_failure: status.health.last_failure,
            avg_latency: status.health.avg_latency,
            request_count: status.health.request_count,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" while at least one gateway is healthy, otherwise "degraded"
    pub status: &'static str,
    /// "degraded" once any state write has been swallowed
    pub persistence_status: &'static str,
    pub healthy_gateways: usize,
    pub total_gateways: usize,
    pub gateways: Vec<GatewayHealthView>,
}

/// Reset acknowledgement
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub status: &'static str,
    pub reset_gateways: usize,
    pub message: String,
}

/// GET /health
pub async fn handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let now = state.now_ms();
    let snapshot = state.selector().snapshot(now).await;

    let total_gateways = snapshot.len();
    let healthy_gateways = snapshot.iter().filter(|s| s.healthy).count();
    let gateways = snapshot
        .into_iter()
        .map(|s| GatewayHealthView::from_status(s, now))
        .collect();

    let persistence_status = if state.metrics().persistence_failures_count() > 0 {
        "degraded"
    } else {
        "operational"
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: if healthy_gateways > 0 { "ok" } else { "degraded" },
            persistence_status,
            healthy_gateways,
            total_gateways,
            gateways,
        }),
    )
}

/// POST /reset
pub async fn reset(State(state): State<AppState>) -> Json<ResetResponse> {
    state.router().reset_all().await;
    let reset_gateways = state.selector().gateway_count();

    tracing::warn!(reset_gateways = reset_gateways, "Gateway health reset by operator");

    Json(ResetResponse {
        status: "ok",
        reset_gateways,
        message: format!("Reset health for {reset_gateways} gateway(s)"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::health::HealthPatch;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn create_test_state() -> AppState {
        let config: Config = r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [[gateways]]
            id = "a"
            url = "http://localhost:1234"

            [[gateways]]
            id = "b"
            name = "Backup"
            url = "http://localhost:1235"
            priority = 2
        "#
        .parse()
        .unwrap();

        AppState::new(
            Arc::new(config),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(10_000)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_counts_and_records() {
        let state = create_test_state();
        state
            .selector()
            .health_store()
            .update(
                "a",
                HealthPatch {
                    consecutive_failures: Some(1),
                    cooldown_until: Some(40_000),
                    ..Default::default()
                },
            )
            .await;

        let (status, Json(body)) = handler(State(state)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.persistence_status, "operational");
        assert_eq!(body.total_gateways, 2);
        assert_eq!(body.healthy_gateways, 1);

        let a = &body.gateways[0];
        assert_eq!(a.id, "a");
        assert_eq!(a.name, "a");
        assert!(!a.healthy);
        assert_eq!(a.cooldown_remaining_ms, 30_000);
        assert_eq!(body.gateways[1].name, "Backup");
    }

    #[tokio::test]
    async fn test_reset_clears_every_gateway() {
        let state = create_test_state();
        for id in ["a", "b"] {
            state
                .selector()
                .health_store()
                .update(
                    id,
                    HealthPatch {
                        consecutive_failures: Some(3),
                        cooldown_until: Some(99_000),
                        ..Default::default()
                    },
                )
                .await;
        }

        let Json(ack) = reset(State(state.clone())).await;
        assert_eq!(ack.reset_gateways, 2);

        let (_, Json(body)) = handler(State(state)).await;
        assert_eq!(body.healthy_gateways, 2);
        assert!(body.gateways.iter().all(|g| g.consecutive_failures == 0));
    }
}
