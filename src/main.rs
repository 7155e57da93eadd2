//! # Catalog Gateway - Main Entry Point
//!
//! Loads configuration (`GATEWAY_CONFIG_PATH`, default `config/gateway.yaml`, then
//! environment overrides), initializes logging, builds the server and runs it until
//! SIGINT/SIGTERM.

use catalog_gateway::observability::init_logging;
use catalog_gateway::{GatewayConfig, GatewayResult, GatewayServer};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/gateway.yaml";

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let config_path = std::env::var("GATEWAY_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let config = match GatewayConfig::load_or_default(&config_path).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_logging(&config.observability.logging)?;

    info!("🚀 Starting Catalog Gateway");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("📋 Configuration loaded from {}", config_path);

    let server = match GatewayServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start gateway: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.start().await {
        error!("🚨 Server error: {}", e);
        return Err(e);
    }

    info!("✅ Catalog Gateway shutdown complete");
    Ok(())
}
