//! Switchyard - health-tracked failover router for upstream inference gateways
//!
//! Forwards chat-completion requests to the healthiest configured gateway,
//! penalizes failing gateways with cooldowns, and resets itself when every
//! gateway looks unhealthy. A companion liveness tracker ingests heartbeats
//! from the primary agent and keeps a bounded incident ledger.

pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod liveness;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod selector;
pub mod store;
pub mod telemetry;
pub mod upstream;
