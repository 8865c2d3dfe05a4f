//! Switchyard HTTP server
//!
//! Starts an Axum web server that fails chat-completion traffic over across
//! upstream gateways.

use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use switchyard::{
    cli::{Cli, Command, generate_config_template},
    clock::SystemClock,
    config::{Config, StoreBackend},
    handlers::{self, AppState},
    store::{FileStore, MemoryStore, SharedStore},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                eprintln!("Wrote configuration template to {path}");
            }
            None => print!("{template}"),
        }
        return Ok(());
    }

    let config = Config::from_file(&cli.config)?;

    telemetry::init(&config.observability.log_level);

    let store: SharedStore = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory state store; health and liveness reset on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::File => {
            let store = FileStore::open(&config.store.path).await?;
            tracing::info!(path = %store.root().display(), "Using file state store");
            Arc::new(store)
        }
    };

    let config = Arc::new(config);
    let state = AppState::new(config.clone(), store, Arc::new(SystemClock))?;
    let app = handlers::app(state);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0])),
        config.server.port,
    ));

    tracing::info!(
        gateways = config.gateways.len(),
        max_retries = config.routing.max_retries,
        gateway_timeout_ms = config.routing.gateway_timeout_ms,
        "Starting Switchyard on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
