//! Structured logging setup
//!
//! Configures `tracing-subscriber` with an `EnvFilter`; `RUST_LOG` wins over
//! the configured level.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Default filter directive for a configured level
pub fn default_directive(level: &str) -> String {
    format!("switchyard={level},tower_http=debug")
}

/// Initialize the global subscriber
///
/// Only the first call per process has any effect.
///
/// ```no_run
/// switchyard::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
