//! Gridlock Game Server
//!
//! Two-player game rooms over WebSocket: one hub, one task per room, one
//! reader and writer per connection.

use std::process;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gridlock_server::{config::ServerConfig, connection, hub::Hub};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "gridlock_server=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let listener = match TcpListener::bind(config.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(address = %config.bind_address, error = %err, "failed to bind");
            process::exit(1);
        }
    };

    let hub = Hub::spawn(config.clone());

    info!("Gridlock Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.bind_address);

    tokio::select! {
        _ = connection::serve(listener, hub.clone(), config) => {}
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
            hub.shutdown().await;
        }
    }
}
