//! obdd - OBD Gateway Daemon
//!
//! Serves the Status / Connect / Read / Stop session protocol over HTTP.
//!
//! Usage:
//!   obdd [OPTIONS] [config.toml]
//!
//! Options:
//!   --simulate <trace.jsonl>  Replay a recorded trace instead of the
//!                             configured transport
//!
//! If no config file is provided, uses the mock transport for demo purposes.

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use obd_api::{create_router, AppState};
use obd_session::config::SimulatorConfig;
use obd_session::{create_transport, Session, TransportConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{DaemonConfig, LoggingConfig};

/// Parsed command-line arguments
struct Args {
    /// Daemon config file (TOML)
    config_path: Option<String>,
    /// Trace file overriding the configured transport
    simulate: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut result = Args {
        config_path: None,
        simulate: None,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--simulate" | "-s" => {
                let file = args
                    .get(i + 1)
                    .context("Missing argument for --simulate")?;
                result.simulate = Some(file.clone());
                i += 2;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => {
                // Positional argument = config file
                result.config_path = Some(arg.to_string());
                i += 1;
            }
            other => anyhow::bail!("Unknown argument: {}", other),
        }
    }

    Ok(result)
}

fn print_help() {
    eprintln!(
        r#"obdd - OBD Gateway Daemon

Usage: obdd [OPTIONS] [config.toml]

Options:
  -s, --simulate <trace.jsonl>  Replay a recorded trace (JSON lines)
  -h, --help                    Print this help message

Examples:
  # Run with mock transport
  obdd

  # Run with config file
  obdd config.toml

  # Replay a recorded drive
  obdd --simulate drive.jsonl config.toml
"#
    );
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    let mut config = match args.config_path.as_deref() {
        Some(path) => DaemonConfig::load(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(file) = args.simulate {
        config.transport = TransportConfig::Simulator(SimulatorConfig { file: file.into() });
    }

    init_tracing(&config.logging);
    tracing::info!("Starting obdd (OBD Gateway Daemon)");
    match args.config_path.as_deref() {
        Some(path) => tracing::info!("Loaded config from: {}", path),
        None => tracing::info!("No config file provided, using defaults"),
    }

    let transport = create_transport(&config.transport)
        .await
        .context("Failed to create transport")?;
    let session = Arc::new(Session::new(transport, config.gateway.clone())?);
    tracing::info!(
        transport = ?config.transport,
        device_id = ?config.gateway.device_id,
        autoconnect = config.gateway.autoconnect,
        "Session ready"
    );

    let app = create_router(AppState::new(session.clone()));

    let addr: SocketAddr = format!("{}:{}", config.server.address, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(session.clone()))
        .await?;

    session.shutdown().await;
    tracing::info!("obdd stopped");
    Ok(())
}

/// Resolve on Ctrl-C. Open Read streams are stopped so their connections can
/// finish draining.
async fn shutdown_signal(session: Arc<Session>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    session.stop();
}
