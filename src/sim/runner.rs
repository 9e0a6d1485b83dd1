//! # Simulator Loop
//!
//! Drives a [`SensorModel`] on a fixed interval and publishes every snapshot.
//!
//! Ticks run strictly one after another inside a single task: a tick's
//! publish completes before the next tick or any control command is handled.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::{SensorModel, Tick};
use crate::control::Control;
use crate::error::Result;
use crate::publish::SnapshotPublisher;

/// Counters reported when the loop exits
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub ticks: u64,
    pub publish_failures: u64,
}

/// Run `model` until a [`Control::Shutdown`] arrives or `control` closes
///
/// The first tick fires immediately. On shutdown one final tick is published
/// before returning, so the file reflects the last known state.
///
/// Publish failures are logged and counted; the previous snapshot file stays
/// authoritative and the loop carries on.
pub async fn run<M: SensorModel>(
    mut model: M,
    publisher: &SnapshotPublisher,
    period: Duration,
    mut control: mpsc::Receiver<Control>,
) -> Result<RunStats> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = RunStats::default();

    info!(
        "Starting {} simulator every {}ms -> {}",
        M::NAME,
        period.as_millis(),
        publisher.path().display()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick_once(&mut model, publisher, period, &mut stats).await;
            }

            command = control.recv() => match command {
                Some(Control::Toggle) => {
                    model.toggle();
                    info!("{} simulator toggled", M::NAME);
                }
                Some(Control::Reset) => {
                    model.reset();
                    info!("{} simulator reset to defaults", M::NAME);
                }
                Some(Control::Shutdown) | None => {
                    info!("{} simulator shutting down, publishing final snapshot", M::NAME);
                    tick_once(&mut model, publisher, period, &mut stats).await;
                    break;
                }
            },
        }
    }

    info!(
        "{} simulator stopped after {} ticks ({} publish failures)",
        M::NAME,
        stats.ticks,
        stats.publish_failures
    );
    Ok(stats)
}

async fn tick_once<M: SensorModel>(
    model: &mut M,
    publisher: &SnapshotPublisher,
    period: Duration,
    stats: &mut RunStats,
) {
    let snapshot = model.step(&Tick::new(period, Utc::now()));
    stats.ticks += 1;

    match publisher.publish(&snapshot).await {
        Ok(()) => info!("{}", M::describe(&snapshot)),
        Err(e) => {
            stats.publish_failures += 1;
            warn!("{} snapshot not published: {}", M::NAME, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control;
    use crate::sim::battery::{BatteryModel, BatteryRates};
    use crate::snapshot::BatterySnapshot;

    fn read_battery(publisher: &SnapshotPublisher) -> BatterySnapshot {
        serde_json::from_str(&std::fs::read_to_string(publisher.path()).unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_on_each_tick_and_final_flush() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(dir.path().join("battery.json"));
        let (tx, rx) = control::channel();

        let run_publisher = publisher.clone();
        let handle = tokio::spawn(async move {
            run(
                BatteryModel::new(BatteryRates::default()),
                &run_publisher,
                Duration::from_secs(30),
                rx,
            )
            .await
        });

        // Immediate tick, then two more
        tokio::time::sleep(Duration::from_secs(61)).await;
        tx.send(Control::Shutdown).await.unwrap();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ticks, 4);
        assert_eq!(stats.publish_failures, 0);

        // 85% less 4 ticks of 0.25% each
        assert_eq!(read_battery(&publisher).capacity, 84.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_applies_between_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(dir.path().join("battery.json"));
        let (tx, rx) = control::channel();

        let run_publisher = publisher.clone();
        let handle = tokio::spawn(async move {
            run(
                BatteryModel::new(BatteryRates::default()),
                &run_publisher,
                Duration::from_secs(30),
                rx,
            )
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(Control::Toggle).await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        let snapshot = read_battery(&publisher);
        assert_eq!(snapshot.status, crate::snapshot::BatteryStatus::Charging);

        drop(tx);
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_restores_default_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = SnapshotPublisher::new(dir.path().join("battery.json"));
        let (tx, rx) = control::channel();

        let run_publisher = publisher.clone();
        let handle = tokio::spawn(async move {
            run(
                BatteryModel::new(BatteryRates {
                    charge_per_min: 1.0,
                    discharge_per_min: 20.0,
                }),
                &run_publisher,
                Duration::from_secs(60),
                rx,
            )
            .await
        });

        tokio::time::sleep(Duration::from_secs(121)).await;
        assert!(read_battery(&publisher).capacity < 50.0);

        tx.send(Control::Reset).await.unwrap();
        tx.send(Control::Shutdown).await.unwrap();
        handle.await.unwrap().unwrap();

        // Final flush steps once from the restored defaults
        let snapshot = read_battery(&publisher);
        assert_eq!(snapshot.capacity, 65.0);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let publisher = SnapshotPublisher::new(blocker.join("battery.json"));
        let (tx, rx) = control::channel();

        tx.send(Control::Shutdown).await.unwrap();
        let stats = run(
            BatteryModel::new(BatteryRates::default()),
            &publisher,
            Duration::from_secs(30),
            rx,
        )
        .await
        .unwrap();

        assert!(stats.ticks >= 1);
        assert_eq!(stats.publish_failures, stats.ticks);
    }
}
