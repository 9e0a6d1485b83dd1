//! # YoyoPod Battery Simulator
//!
//! Publishes a mock battery snapshot to `battery.path` on every tick.
//!
//! # Signals
//!
//! - `SIGUSR1`: toggle charging
//! - `SIGUSR2`: reset to 85%, discharging
//! - `SIGTERM` / Ctrl+C: publish a final snapshot and exit
//!
//! Expected output:
//! ```text
//! INFO yoyopod_battery: YoyoPod battery simulator v0.1.0 starting...
//! INFO yoyopod_sim::sim::runner: Starting battery simulator every 30000ms -> /tmp/yoyopod/battery.json
//! INFO yoyopod_sim::sim::runner: Battery: 84.8% | 4.02V | -200mA | Discharging | 25.0°C
//! ```

use anyhow::{Context, Result};
use tracing::info;

use yoyopod_sim::config::Config;
use yoyopod_sim::control;
use yoyopod_sim::logging;
use yoyopod_sim::publish::SnapshotPublisher;
use yoyopod_sim::sim::battery::BatteryModel;
use yoyopod_sim::sim::runner;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_environment().context("Invalid configuration")?;
    let _log_guard = logging::init(&config.logging, "battery");

    info!("YoyoPod battery simulator v{} starting...", env!("CARGO_PKG_VERSION"));

    let publisher = SnapshotPublisher::new(&config.battery.path);
    publisher
        .prepare()
        .await
        .with_context(|| format!("Cannot create snapshot directory for {}", config.battery.path))?;

    let (tx, rx) = control::channel();
    control::listen_for_signals(tx).context("Failed to install signal handlers")?;
    info!("Send SIGUSR1 to toggle charging, SIGUSR2 to reset");

    let model = BatteryModel::new(config.battery.rates());
    runner::run(model, &publisher, config.battery.interval(), rx).await?;

    Ok(())
}
