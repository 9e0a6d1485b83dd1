//! # YoyoPod GPS Simulator
//!
//! Publishes a mock location fix to `gps.path` on every tick, wandering
//! around the configured center.
//!
//! # Signals
//!
//! - `SIGUSR1`: toggle GPS on/off (position freezes while off)
//! - `SIGUSR2`: reset to the center
//! - `SIGTERM` / Ctrl+C: publish a final snapshot and exit

use anyhow::{Context, Result};
use tracing::info;

use yoyopod_sim::config::Config;
use yoyopod_sim::control;
use yoyopod_sim::logging;
use yoyopod_sim::publish::SnapshotPublisher;
use yoyopod_sim::sim::gps::GpsModel;
use yoyopod_sim::sim::runner;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_environment().context("Invalid configuration")?;
    let _log_guard = logging::init(&config.logging, "gps");

    info!("YoyoPod GPS simulator v{} starting...", env!("CARGO_PKG_VERSION"));

    let publisher = SnapshotPublisher::new(&config.gps.path);
    publisher
        .prepare()
        .await
        .with_context(|| format!("Cannot create snapshot directory for {}", config.gps.path))?;

    let (tx, rx) = control::channel();
    control::listen_for_signals(tx).context("Failed to install signal handlers")?;

    let area = config.gps.area();
    info!(
        "Walking within {:.0}m of {:.6}, {:.6}; SIGUSR1 toggles GPS, SIGUSR2 resets",
        area.radius_m, area.center.lat, area.center.lon
    );

    runner::run(GpsModel::new(area), &publisher, config.gps.interval(), rx).await?;

    Ok(())
}
