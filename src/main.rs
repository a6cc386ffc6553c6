//! Overlay request-forwarding gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────── front loop (main runtime) ──────────────────────────┐
//!  Client Request ────▶│ http::server ─▶ driver (per-request task) ─▶ routing ─▶ bridge::submit       │
//!                      │        ▲                 ▲   (wake queue)                   │                │
//!  Client Response ◀───│ http::response ◀── assembler drain                           │                │
//!                      └──────────────────────────┼───────────────────────────────────┼────────────────┘
//!                                                 │ continuations                     │ blocking job
//!                      ┌──────────────────────────┼──────── back loop (own thread) ───▼────────────────┐
//!                      │  ExchangeRelay ◀── backend exchange ◀── lease.issue    client_pool::acquire   │──▶ Backend
//!                      └───────────────────────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use overlay_gateway::config::load_config;
use overlay_gateway::lifecycle::signals::spawn_signal_listener;
use overlay_gateway::observability::{logging, metrics};
use overlay_gateway::{Gateway, Shutdown};

#[derive(Parser)]
#[command(name = "overlay-gateway")]
#[command(about = "Request-forwarding gateway with pooled backend clients", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. The gateway has no routes
    /// without one, so it is required.
    #[arg(short, long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!("overlay-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        pool_capacity = config.pool.capacity,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let gateway = Gateway::start(config)?;

    let listener = TcpListener::bind(&gateway.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_listener(shutdown.clone());

    let server = gateway.server();
    server.run(listener, shutdown.signalled()).await?;

    tokio::task::spawn_blocking(move || gateway.shutdown()).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
