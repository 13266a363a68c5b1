//! Blockmod Server - authoritative block game simulation
//!
//! This is the main entry point for the server. It handles:
//! - Loading configuration, game tunables and the map
//! - Running the tick loop
//! - Logging outbound traffic until a network layer subscribes

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blockmod_server::config::Config;
use blockmod_server::game::collision::{Collision, DEFAULT_ARENA};
use blockmod_server::game::{GameServer, GameWorld, Outbound};
use blockmod_server::util::time::{init_server_time, uptime_secs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Blockmod Server");

    let game_config = config.load_game_config()?;
    let collision = match &config.map_path {
        Some(path) => {
            let src = std::fs::read_to_string(path)
                .with_context(|| format!("reading map {}", path.display()))?;
            Collision::from_ascii(&src).with_context(|| format!("parsing map {}", path.display()))?
        }
        None => Collision::from_ascii(DEFAULT_ARENA)?,
    };
    info!(
        width = collision.width(),
        height = collision.height(),
        tick_speed = config.tick_speed,
        snapshot_rate = config.snapshot_rate,
        max_clients = config.max_clients,
        "world loaded"
    );

    let world = GameWorld::new(
        Arc::new(game_config),
        Arc::new(collision),
        config.tick_speed,
        config.world_seed,
        config.max_clients,
    );
    let (server, handle) = GameServer::new(world, config.snapshot_rate);
    let server_task = tokio::spawn(server.run());

    let mut outbound = handle.subscribe();
    tokio::spawn(async move {
        loop {
            match outbound.recv().await {
                Ok(Outbound::Message { recipient, msg, .. }) => {
                    debug!(?recipient, ?msg, "outbound message");
                }
                Ok(Outbound::Snapshot { client_id, tick, items, .. }) => {
                    debug!(client_id, tick, items = items.len(), "outbound snapshot");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "outbound log lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    shutdown_signal().await;

    // dropping the last command sender stops the tick loop
    drop(handle);
    server_task.await?;

    info!(uptime_secs = uptime_secs(), "Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
