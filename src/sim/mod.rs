//! # Sensor Simulation Module
//!
//! Physical models for the mock battery and GPS, and the loop that drives them.
//!
//! This module handles:
//! - Stepping a model forward by one tick
//! - Applying operator controls (toggle, reset) between ticks
//! - Publishing each snapshot through [`crate::publish::SnapshotPublisher`]

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

pub mod battery;
pub mod geo;
pub mod gps;
pub mod runner;

/// Timing information handed to a model for one step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Nominal time covered by this tick (the update interval)
    pub elapsed: Duration,
    /// Wall-clock time of the tick
    pub now: DateTime<Utc>,
}

impl Tick {
    pub fn new(elapsed: Duration, now: DateTime<Utc>) -> Self {
        Self { elapsed, now }
    }

    /// Nominal elapsed time in minutes
    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed.as_millis() as f64 / 60_000.0
    }
}

/// A simulated sensor driven by [`runner::run`]
///
/// State is owned by the model and mutated only through these methods, which
/// the runner calls from a single task.
pub trait SensorModel: Send {
    /// Published snapshot type
    type Snapshot: Serialize + Send + Sync;

    /// Short name used in log lines
    const NAME: &'static str;

    /// Advance the model by one tick and return the snapshot to publish
    fn step(&mut self, tick: &Tick) -> Self::Snapshot;

    /// Flip the operator-controlled flag (charging or GPS enabled)
    fn toggle(&mut self);

    /// Restore the default state
    fn reset(&mut self);

    /// One-line human-readable summary of a snapshot
    fn describe(snapshot: &Self::Snapshot) -> String;
}
