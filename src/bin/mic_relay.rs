//! # YoyoPod Microphone Relay
//!
//! Serves live microphone audio to dashboard listeners over WebSocket.
//! One `arecord` process runs while at least one listener is connected.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info};

use yoyopod_sim::config::Config;
use yoyopod_sim::control::{self, Control};
use yoyopod_sim::logging;
use yoyopod_sim::relay::capture::ArecordSpawner;
use yoyopod_sim::relay::{server, MicRelay};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_environment().context("Invalid configuration")?;
    let _log_guard = logging::init(&config.logging, "mic-relay");

    info!("YoyoPod microphone relay v{} starting...", env!("CARGO_PKG_VERSION"));

    let spawner = Arc::new(ArecordSpawner::new(config.relay.capture_settings()));
    let relay = MicRelay::new(spawner, config.relay.queue_depth);

    let listener = TcpListener::bind(&config.relay.bind)
        .await
        .with_context(|| format!("Cannot bind {}", config.relay.bind))?;
    info!("Listening on ws://{}/mic", listener.local_addr()?);

    let (tx, mut rx) = control::channel();
    control::listen_for_signals(tx).context("Failed to install signal handlers")?;

    let shutdown_relay = relay.clone();
    axum::serve(listener, server::router(relay.clone()))
        .with_graceful_shutdown(async move {
            while let Some(command) = rx.recv().await {
                if command == Control::Shutdown {
                    break;
                }
                debug!("Ignoring {:?} in microphone relay", command);
            }
            info!("Shutting down, closing microphone sessions");
            shutdown_relay.shutdown().await;
        })
        .await
        .context("Relay server failed")?;

    relay.shutdown().await;
    info!("Microphone relay stopped");
    Ok(())
}
