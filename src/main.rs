//! guac-gateway - Guacamole protocol gateway
//!
//! This binary accepts WebSocket clients speaking the Guacamole wire
//! protocol and relays each of them to a guacd daemon, negotiating the
//! guacd handshake from the request's query parameters.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use guac_gateway::{config, ws, GatewayConfig, Result, SessionRegistry};

#[derive(Parser)]
#[command(name = "guac-gateway")]
#[command(version = "0.1.0")]
#[command(about = "Guacamole protocol gateway relaying WebSocket clients to guacd")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listen address
    #[arg(long)]
    listen_address: Option<String>,

    /// Override listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Override guacd address (host:port)
    #[arg(long)]
    guacd_address: Option<String>,

    /// Enable verbose/debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: --verbose flag, then RUST_LOG env var, then default "info"
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };
    tracing_subscriber::fmt().with_env_filter(&log_level).init();

    info!("Starting guac-gateway v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => {
            let loaded = config::load_config(path)?;
            info!("Loaded configuration from {:?}", path);
            loaded
        }
        None => {
            let mut defaults = GatewayConfig::default();
            config::apply_env_overrides(&mut defaults);
            defaults
        }
    };

    // Apply CLI overrides
    if let Some(addr) = cli.listen_address {
        config.listen_address = addr;
    }
    if let Some(port) = cli.listen_port {
        config.listen_port = port;
    }
    if let Some(addr) = cli.guacd_address {
        config.guacd_address = addr;
    }
    config.validate()?;

    let config = Arc::new(config);
    let registry = Arc::new(SessionRegistry::new());

    let listener =
        TcpListener::bind((config.listen_address.as_str(), config.listen_port)).await?;
    info!(
        "Gateway ready: listening on {}:{} -> guacd at {}",
        config.listen_address, config.listen_port, config.guacd_address
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let serve_config = config.clone();
    let serve_registry = registry.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = ws::serve(listener, serve_config, serve_registry, shutdown_rx).await {
            error!("Transport error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = async {
            #[cfg(unix)]
            {
                let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler");
                sigterm.recv().await;
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = server.await;

    info!("Shutdown complete. Sessions still registered: {}", registry.len());
    Ok(())
}
