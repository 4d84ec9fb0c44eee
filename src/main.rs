//! Path-routed reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────────┐
//!                      │                    PATH PROXY                      │
//!                      │                                                    │
//!   Client Request     │  ┌─────────┐    ┌──────────┐                       │
//!   ───────────────────┼─▶│  http   │───▶│ routing  │──┬─ "/" ─▶ greeting   │
//!                      │  │ server  │    │  table   │  │                    │
//!                      │  └─────────┘    └──────────┘  ├─ ws prefix         │
//!                      │                               │    ▼               │
//!                      │                               │ ┌───────────────┐  │
//!                      │                               │ │   websocket   │◀─┼──▶ WS Backend
//!                      │                               │ │ dial/upgrade/ │  │
//!                      │                               │ │ relay/session │  │
//!                      │                               │ └───────────────┘  │
//!                      │                               ├─ http prefix       │
//!                      │                               │    ▼               │
//!                      │                               │ ┌───────────────┐  │
//!                      │                               │ │ http forward  │◀─┼──▶ HTTP Backend
//!                      │                               │ └───────────────┘  │
//!                      │                               └─ else ─▶ 404       │
//!                      │                                                    │
//!                      │  config · observability · resilience · lifecycle   │
//!                      └────────────────────────────────────────────────────┘
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;

use path_proxy::config::loader::load_from_env;
use path_proxy::config::schema::ObservabilityConfig;
use path_proxy::lifecycle::signals::wait_for_signal;
use path_proxy::observability::logging;
use path_proxy::{HttpServer, Shutdown};

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(&ObservabilityConfig::default());

    tracing::info!("path-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_from_env()?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        idle_timeout_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );
    tracing::debug!(config = %serde_json::to_string(&config)?, "Effective configuration");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, shutdown.clone())?;

    // Bind TCP listener
    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener).await?;
    Ok(())
}
