//! Command-line interface for Switchyard
//!
//! Provides argument parsing and subcommand handling for the Switchyard binary.

use clap::{Parser, Subcommand};

/// Health-tracked failover router for upstream inference gateways
#[derive(Parser)]
#[command(name = "switchyard")]
#[command(version)]
#[command(about = "Health-tracked failover router for upstream inference gateways")]
#[command(
    long_about = "Switchyard forwards chat-completion traffic to the healthiest upstream \
    gateway, cools down gateways that fail, and tracks primary-agent heartbeats so a \
    remote fallback knows when to take over."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# Switchyard Configuration
# ========================

# ─────────────────────────────────────────────────────────────────────────────
# SERVER
# ─────────────────────────────────────────────────────────────────────────────

[server]
# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "0.0.0.0"
port = 3000

# ─────────────────────────────────────────────────────────────────────────────
# UPSTREAM
# ─────────────────────────────────────────────────────────────────────────────
#
# base_url is used by every gateway that does not set its own url.
# Override at runtime with SWITCHYARD_UPSTREAM_URL / SWITCHYARD_UPSTREAM_TOKEN.

[upstream]
base_url = "http://localhost:8080"
# api_key = "sk-..."

# ─────────────────────────────────────────────────────────────────────────────
# GATEWAYS
# ─────────────────────────────────────────────────────────────────────────────
#
# Fields:
#   - id: stable identifier, used as the health record key
#   - name: display name (defaults to id)
#   - url: gateway base URL (optional, falls back to upstream.base_url)
#   - priority: lower = preferred

[[gateways]]
id = "primary"
name = "Primary gateway"
priority = 1

[[gateways]]
id = "secondary"
name = "Secondary gateway"
url = "http://localhost:8081"
priority = 2

# ─────────────────────────────────────────────────────────────────────────────
# ROUTING
# ─────────────────────────────────────────────────────────────────────────────

[routing]
# Cooldown after a generic 5xx, and the base of the exponential backoff
cooldown_base_ms = 30000
# Cooldown after a 429, and the cap of the backoff
cooldown_max_ms = 300000
# Per-attempt upstream timeout
gateway_timeout_ms = 60000
# Gateways tried per request
max_retries = 3
# Random extra backoff as a fraction of the backoff (0.0 disables)
backoff_jitter = 0.0

# ─────────────────────────────────────────────────────────────────────────────
# LIVENESS
# ─────────────────────────────────────────────────────────────────────────────

[liveness]
# Silence after which GET /takeover reports should_take_over = true
local_agent_timeout_ms = 300000

# ─────────────────────────────────────────────────────────────────────────────
# STATE STORE
# ─────────────────────────────────────────────────────────────────────────────

[store]
# "memory" (lost on restart) or "file" (one JSON document per key under path)
backend = "file"
path = "state"

# ─────────────────────────────────────────────────────────────────────────────
# MODELS
# ─────────────────────────────────────────────────────────────────────────────

[models]
# Ids listed by GET /v1/models
ids = ["auto"]

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# Prometheus metrics are always available at /metrics on the server port
"#
}
