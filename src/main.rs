//! Gateway control plane
//!
//! Local control process for a traffic-capturing MCP gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                              ┌──────────────────────────────────────────────────────┐
//!                              │                   CONTROL PLANE                      │
//!                              │                                                      │
//!     Dashboard / CLI          │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!     ─────────────────────────┼─▶│   net   │───▶│  http   │───▶│  lifecycle   │      │
//!                              │  │listener │    │  api    │    │ orchestrator │      │
//!                              │  └─────────┘    └────┬────┘    └──────┬───────┘      │
//!                              │                      │                │              │
//!                              │                      ▼                ▼              │
//!                              │               ┌────────────┐   ┌─────────────┐       │
//!     Observers (WebSocket)    │               │ observers  │   │   gateway   │───────┼──▶ Gateway
//!     ◀────────────────────────┼───────────────│ hub + ping │   │ supervisor  │       │    process
//!                              │               └─────▲──────┘   └──────┬──────┘       │
//!                              │                     │                 │              │
//!                              │               ┌─────┴──────┐   ┌──────▼──────┐       │
//!                              │               │ log ring   │◀──│ child output│       │
//!                              │               └────────────┘   └─────────────┘       │
//!                              │                                                      │
//!     Client config file       │  ┌─────────┐    ┌─────────┐    ┌──────────────┐      │
//!     ◀────────────────────────┼──│ backup  │◀───│   mcp   │◀───│   health     │      │
//!                              │  │+registry│    │ rewrite │    │  readiness   │      │
//!                              │  └─────────┘    └─────────┘    └──────────────┘      │
//!                              └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use gateway_control::config::{self, load_config};
use gateway_control::lifecycle::{bootstrap, run_with_watchdog, wait_for_termination, BootstrapOptions};
use gateway_control::net;
use gateway_control::observability::{logging::init_logging, metrics::init_metrics};

#[derive(Parser)]
#[command(name = "gateway-control")]
#[command(about = "Local control plane for an MCP traffic-capturing gateway", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONTROL_CONFIG")]
    config: Option<PathBuf>,

    /// Control API bind address
    #[arg(short, long)]
    bind: Option<String>,

    /// Port the gateway listens on
    #[arg(long, env = config::GATEWAY_PORT_ENV)]
    gateway_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    if let Some(port) = args.gateway_port {
        config.gateway.port = port;
    }
    config::validate_config(&config).map_err(config::ConfigError::Validation)?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gateway-control starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        gateway_port = config.gateway.port,
        gateway_config = %config.gateway.config_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let watchdog = Duration::from_millis(config.shutdown.watchdog_ms);
    let app = bootstrap(config, BootstrapOptions::default())?;
    let listener = net::bind(&app.config.listener).await?;
    let running = app.serve(listener)?;

    tracing::info!(address = %running.local_addr, "Control API ready");

    tokio::select! {
        signal = wait_for_termination() => {
            tracing::info!(signal, "Termination signal received");
        }
        _ = app.shutdown_requests.notified() => {
            tracing::info!("Shutdown requested over the API");
        }
    }

    match run_with_watchdog(&running.coordinator, watchdog).await {
        Ok(report) => {
            tracing::info!(?report, "Shutdown complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Cleanup timed out, restoring client config synchronously");
            running.exit_guard.restore_now();
            std::process::exit(1);
        }
    }
}
