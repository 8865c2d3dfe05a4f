//! Configuration management for Switchyard
//!
//! Parses TOML configuration files and provides typed access to settings.
//! The configuration is built once at startup (file + environment overrides),
//! validated, and then shared immutably behind an `Arc` for the lifetime of the
//! process.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Environment variable overriding `upstream.base_url`
pub const ENV_UPSTREAM_URL: &str = "SWITCHYARD_UPSTREAM_URL";
/// Environment variable overriding `upstream.api_key`
pub const ENV_UPSTREAM_TOKEN: &str = "SWITCHYARD_UPSTREAM_TOKEN";

/// Upper bound for the per-attempt upstream timeout
const MAX_GATEWAY_TIMEOUT_MS: u64 = 300_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    pub gateways: Vec<GatewayConfig>,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Shared upstream settings
///
/// `base_url` is the fallback URL for gateways that do not set their own.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    /// Bearer credential sent to every gateway
    #[serde(default)]
    pub api_key: Option<String>,
}

/// A single upstream gateway
///
/// Fields are private; construct via deserialization or [`GatewayConfig::new`]
/// and validate through [`Config::validate`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GatewayConfig {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    url: Option<String>,
    /// Lower = preferred
    #[serde(default = "default_priority")]
    priority: i32,
}

fn default_priority() -> i32 {
    1
}

impl GatewayConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            url: Some(url.into()),
            priority,
        }
    }

    /// Stable identifier, used as the health record key
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name (defaults to the id)
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Resolved base URL; empty until resolved against `upstream.base_url`
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("")
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Failover tuning knobs
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Short penalty for generic 5xx, and the base of the exponential backoff
    #[serde(default = "default_cooldown_base_ms")]
    pub cooldown_base_ms: u64,
    /// Longest penalty; applied to 429 and caps the backoff
    #[serde(default = "default_cooldown_max_ms")]
    pub cooldown_max_ms: u64,
    /// Per-attempt upstream timeout
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
    /// Maximum number of candidates tried per request
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Fraction of random jitter added to backoff cooldowns (0.0 disables)
    #[serde(default)]
    pub backoff_jitter: f64,
}

fn default_cooldown_base_ms() -> u64 {
    30_000
}

fn default_cooldown_max_ms() -> u64 {
    300_000
}

fn default_gateway_timeout_ms() -> u64 {
    60_000
}

fn default_max_retries() -> usize {
    3
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            cooldown_base_ms: default_cooldown_base_ms(),
            cooldown_max_ms: default_cooldown_max_ms(),
            gateway_timeout_ms: default_gateway_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_jitter: 0.0,
        }
    }
}

impl RoutingConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

/// Heartbeat / takeover settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LivenessConfig {
    #[serde(default = "default_local_agent_timeout_ms")]
    pub local_agent_timeout_ms: u64,
}

fn default_local_agent_timeout_ms() -> u64 {
    300_000
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            local_agent_timeout_ms: default_local_agent_timeout_ms(),
        }
    }
}

/// Which durable store backend to use
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    File,
}

/// Durable store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory for the file backend
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "state".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// Static model listing served by `GET /v1/models`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    #[serde(default = "default_model_ids")]
    pub ids: Vec<String>,
}

fn default_model_ids() -> Vec<String> {
    vec!["auto".to_string()]
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            ids: default_model_ids(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, applying environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        let mut config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.resolve_gateway_urls();

        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Apply environment overrides using the given lookup
    ///
    /// Takes a lookup function rather than reading `std::env` directly so the
    /// override rules can be tested without mutating process state.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_UPSTREAM_URL).filter(|v| !v.trim().is_empty()) {
            tracing::debug!(url = %url, "Upstream base URL overridden from environment");
            self.upstream.base_url = Some(url);
        }
        if let Some(token) = lookup(ENV_UPSTREAM_TOKEN).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("Upstream bearer credential provided via environment");
            self.upstream.api_key = Some(token);
        }
    }

    /// Fill in gateway URLs that were left unset from `upstream.base_url`
    pub fn resolve_gateway_urls(&mut self) {
        let Some(base_url) = self.upstream.base_url.clone() else {
            return;
        };
        for gateway in &mut self.gateways {
            if gateway.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                gateway.url = Some(base_url.clone());
            }
        }
    }

    /// Look up a configured gateway by id
    pub fn gateway(&self, id: &str) -> Option<&GatewayConfig> {
        self.gateways.iter().find(|g| g.id == id)
    }

    /// Validate configuration after parsing
    pub fn validate(&self) -> AppResult<()> {
        if self.gateways.is_empty() {
            return Err(AppError::Config(
                "at least one [[gateways]] entry is required".to_string(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for gateway in &self.gateways {
            if gateway.id.trim().is_empty() {
                return Err(AppError::Config("gateway id cannot be empty".to_string()));
            }
            if !seen.insert(gateway.id.as_str()) {
                return Err(AppError::Config(format!(
                    "duplicate gateway id '{}'",
                    gateway.id
                )));
            }

            let url = gateway.url();
            if url.is_empty() {
                return Err(AppError::Config(format!(
                    "gateway '{}' has no url and upstream.base_url is not set \
                    (set it in the config or via {})",
                    gateway.id, ENV_UPSTREAM_URL
                )));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "gateway '{}' has invalid url '{}': must start with 'http://' or 'https://'",
                    gateway.id, url
                )));
            }
        }

        let routing = &self.routing;
        if routing.cooldown_base_ms == 0 {
            return Err(AppError::Config(
                "routing.cooldown_base_ms must be greater than 0".to_string(),
            ));
        }
        if routing.cooldown_base_ms > routing.cooldown_max_ms {
            return Err(AppError::Config(format!(
                "routing.cooldown_base_ms ({}) cannot exceed routing.cooldown_max_ms ({})",
                routing.cooldown_base_ms, routing.cooldown_max_ms
            )));
        }
        if routing.gateway_timeout_ms == 0 || routing.gateway_timeout_ms > MAX_GATEWAY_TIMEOUT_MS {
            return Err(AppError::Config(format!(
                "routing.gateway_timeout_ms must be in (0, {}], got {}",
                MAX_GATEWAY_TIMEOUT_MS, routing.gateway_timeout_ms
            )));
        }
        if routing.max_retries == 0 {
            return Err(AppError::Config(
                "routing.max_retries must be at least 1".to_string(),
            ));
        }
        if !routing.backoff_jitter.is_finite() || !(0.0..=1.0).contains(&routing.backoff_jitter) {
            return Err(AppError::Config(format!(
                "routing.backoff_jitter must be a finite number between 0.0 and 1.0, got {}",
                routing.backoff_jitter
            )));
        }

        if self.liveness.local_agent_timeout_ms == 0 {
            return Err(AppError::Config(
                "liveness.local_agent_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    /// Parse and validate without consulting the process environment
    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let mut config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.resolve_gateway_urls();
        config.validate()?;
        Ok(config)
    }
}
