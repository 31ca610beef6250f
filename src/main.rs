//! Presence Chat Server - Entry Point
//!
//! Starts the TCP listener and SessionManager actor, accepting connections
//! until Ctrl-C.

use std::env;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use presence_chat::{serve, ServerConfig, SessionCommand, SessionManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=presence_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("presence_chat=info")),
        )
        .init();

    // Defaults, CHAT_CONFIG file, CHAT_* env vars, then bind address argument
    let config = ServerConfig::load(env::args())?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("WebSocket Chat Server listening on {}", config.bind_addr);

    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    let manager = SessionManager::new(cmd_rx, &config);

    let mut presence = manager.subscribe_presence();
    tokio::spawn(async move {
        while presence.changed().await.is_ok() {
            let online = presence.borrow_and_update().len();
            info!("Users online: {}", online);
        }
    });

    let manager_task = tokio::spawn(manager.run());
    info!("SessionManager actor started");

    tokio::select! {
        _ = serve(listener, cmd_tx.clone(), config.outbound_buffer) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        }
    }

    let _ = cmd_tx.send(SessionCommand::Shutdown).await;
    manager_task.await?;

    Ok(())
}
