//! mbridged - Device bridge daemon
//!
//! Serves the REST API over an asynchronous device-control stack. Every
//! request is issued to the stack under a single serialization gate and
//! answered once the stack has delivered its complete result set.
//!
//! If no config file is provided, runs the simulated stack with a demo node.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use mbridge_api::{create_router, AppState};
use mbridge_correlate::{create_stack, DeviceController};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BridgeConfig;

#[derive(Parser, Debug)]
#[command(name = "mbridged")]
#[command(author, version, about = "Device bridge daemon")]
struct Args {
    /// Configuration file (TOML)
    #[arg(env = "MBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "mbridged=info,mbridge_api=info,mbridge_correlate=debug,tower_http=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    tracing::info!("Starting mbridged");

    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading config from: {}", path.display());
            BridgeConfig::load(path)?
        }
        None => {
            tracing::info!("No config file provided, using simulated stack with a demo node");
            BridgeConfig::demo()
        }
    };
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let stack = create_stack(&config.stack)?;
    tracing::info!(
        stack = stack.name(),
        key_policy = ?config.correlation.key_policy,
        "Device stack ready"
    );

    let controller = Arc::new(DeviceController::new(stack, config.correlation.clone()));
    let app = create_router(AppState::new(controller), config.server.cors_enable);

    let addr = config.server.addr();
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("mbridged stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
