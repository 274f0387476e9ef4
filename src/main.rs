//! Event gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   EVENT GATEWAY                   │
//!                       │                                                   │
//!   Client Request      │  ┌─────────┐    ┌──────────┐    ┌─────────────┐  │
//!   ────────────────────┼─▶│  http   │───▶│ routing  │───▶│   forward   │──┼──▶ POST event
//!                       │  │ handler │    │  table   │    │ envelope +  │  │    to backend
//!                       │  └─────────┘    └────▲─────┘    │  multipart  │  │
//!                       │                      │          └─────────────┘  │
//!                       │                 ┌────┴─────┐                     │
//!   Control Plane       │                 │ control  │                     │
//!   ────────────────────┼────────────────▶│ register │                     │
//!                       │                 └──────────┘                     │
//!   Client Response     │  ┌─────────┐    ┌──────────┐                     │
//!   ◀───────────────────┼──│ writer  │◀───│ protocol │◀────────────────────┼─── Instruction
//!                       │  │         │    │ decoder  │                     │    stream
//!                       │  └─────────┘    └──────────┘                     │
//!                       └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use event_gateway::config::loader::{load_config, load_default};
use event_gateway::lifecycle::{signals, startup, Shutdown};
use event_gateway::observability::{logging, metrics};
use event_gateway::GatewayServer;

#[derive(Parser)]
#[command(name = "event-gateway")]
#[command(about = "HTTP gateway forwarding requests to backends as events", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default()?,
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("event-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        external_address = %config.listener.external_address,
        internal_address = %config.listener.internal_address,
        snapshot = %config.routing.snapshot_path,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let state = startup::build_state(config)?;
    let (external, internal) = startup::bind_listeners(&state.config).await?;
    let server = GatewayServer::new(state);

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(external, internal, server_shutdown));

    signals::shutdown_on_signal(&shutdown).await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
