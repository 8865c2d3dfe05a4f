//! HTTP request handlers for the Switchyard API

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::health::GatewayHealthStore;
use crate::liveness::{IncidentLedger, LivenessStore, LivenessTracker};
use crate::metrics::Metrics;
use crate::middleware::request_id_middleware;
use crate::router::RequestRouter;
use crate::selector::GatewaySelector;
use crate::store::SharedStore;
use crate::upstream::UpstreamClient;

pub mod health;
pub mod heartbeat;
pub mod incidents;
pub mod metrics;
pub mod openai;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning across Axum handlers.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    selector: Arc<GatewaySelector>,
    router: Arc<RequestRouter>,
    liveness: Arc<LivenessTracker>,
    incidents: Arc<IncidentLedger>,
    metrics: Arc<Metrics>,
    clock: SharedClock,
}

impl AppState {
    /// Wire every component on top of one durable store and clock
    ///
    /// # Errors
    ///
    /// Returns an error if metrics registration or HTTP client creation fails.
    pub fn new(config: Arc<Config>, store: SharedStore, clock: SharedClock) -> AppResult<Self> {
        let metrics = Arc::new(Metrics::new().map_err(|e| {
            AppError::Internal(format!("Failed to initialize metrics: {e}"))
        })?);

        let health = Arc::new(GatewayHealthStore::new(store.clone(), metrics.clone()));
        let selector = Arc::new(GatewaySelector::new(config.clone(), health));

        let upstream = UpstreamClient::new(
            config.upstream.api_key.clone(),
            config.routing.gateway_timeout(),
        )
        .map_err(|e| AppError::Internal(e.to_string()))?;

        let router = Arc::new(RequestRouter::new(
            config.clone(),
            selector.clone(),
            upstream,
            clock.clone(),
            metrics.clone(),
        ));

        let liveness_store = Arc::new(LivenessStore::new(store, metrics.clone()));
        let liveness = Arc::new(LivenessTracker::new(
            liveness_store.clone(),
            clock.clone(),
            metrics.clone(),
            config.liveness.local_agent_timeout_ms,
        ));
        let incidents = Arc::new(IncidentLedger::new(
            liveness_store,
            clock.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            selector,
            router,
            liveness,
            incidents,
            metrics,
            clock,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn selector(&self) -> &GatewaySelector {
        &self.selector
    }

    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn incidents(&self) -> &IncidentLedger {
        &self.incidents
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Current time in epoch milliseconds
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

/// Build the full HTTP application
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(openai::completions::handler),
        )
        .route("/v1/models", get(openai::models::handler))
        .route("/health", get(health::handler))
        .route("/reset", post(health::reset))
        .route("/heartbeat", post(heartbeat::handler))
        .route("/state", get(heartbeat::state))
        .route("/state/reset", post(heartbeat::reset_state))
        .route("/takeover", get(heartbeat::takeover))
        .route("/gateway/incident", post(incidents::record))
        .route("/gateway/incidents", get(incidents::list))
        .route("/gateway/incidents/clear", post(incidents::clear))
        .route("/metrics", get(metrics::handler))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    fn create_test_state() -> AppState {
        let config: Config = r#"
            [server]
            host = "127.0.0.1"
            port = 3000

            [[gateways]]
            id = "primary"
            url = "http://localhost:1234"
            priority = 1

            [[gateways]]
            id = "backup"
            url = "http://localhost:1235"
            priority = 2
        "#
        .parse()
        .unwrap();

        AppState::new(
            Arc::new(config),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(1_000)),
        )
        .unwrap()
    }

    #[test]
    fn test_appstate_new_creates_state() {
        let state = create_test_state();
        assert_eq!(state.config().server.port, 3000);
        assert_eq!(state.selector().gateway_count(), 2);
        assert_eq!(state.now_ms(), 1_000);
        assert_eq!(
            state.liveness().timeout_ms(),
            state.config().liveness.local_agent_timeout_ms
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_reset_futures_are_send() {
        let state = create_test_state();
        let router_reset = state.router().reset_all();
        assert_send(&router_reset);
        let handler_reset = health::reset(axum::extract::State(state.clone()));
        assert_send(&handler_reset);
    }

    #[test]
    fn test_appstate_is_clonable() {
        let state = create_test_state();
        let state2 = state.clone();
        assert!(Arc::ptr_eq(state.metrics(), state2.metrics()));
    }
}
