//! # GPS Model
//!
//! Bounded random walk around a configured center.
//!
//! Each tick moves up to [`MAX_STEP_M`] meters in a random direction. A step
//! that would leave the walk radius is replaced by a pull toward the center
//! by a random fraction in [`PULL_BACK_MIN`]..=[`PULL_BACK_MAX`], so the walk
//! stays bounded without bouncing off a hard wall.
//!
//! While disabled the position is frozen and the last snapshot is republished
//! verbatim, timestamp included. Consumers detect the outage through
//! staleness; the snapshot carries no enabled flag.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

use super::geo::{haversine_m, initial_bearing_deg, lerp, offset, round_to, LatLon};
use super::{SensorModel, Tick};
use crate::snapshot::LocationSnapshot;

/// Longest single step in meters
pub const MAX_STEP_M: f64 = 50.0;

/// Pull-back fraction range when a step leaves the radius
pub const PULL_BACK_MIN: f64 = 0.3;
pub const PULL_BACK_MAX: f64 = 0.7;

/// Minimum displacement before the heading is updated
pub const HEADING_MIN_DISPLACEMENT_M: f64 = 0.5;

/// Accuracy range in meters
pub const ACCURACY_RANGE_M: (f64, f64) = (5.0, 50.0);

/// Satellite count range
pub const SATELLITE_RANGE: (u8, u8) = (6, 12);

/// Altitude jitter per tick in meters
pub const ALTITUDE_JITTER_M: f64 = 1.0;

const DEFAULT_ALTITUDE_M: f64 = 10.0;
const DEFAULT_ACCURACY_M: f64 = 10.0;
const DEFAULT_SATELLITES: u8 = 8;

/// Walk center and radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkArea {
    pub center: LatLon,
    pub radius_m: f64,
}

/// In-memory GPS state
#[derive(Debug, Clone, PartialEq)]
pub struct GpsState {
    pub position: LatLon,
    pub altitude: f64,
    pub accuracy: f64,
    pub speed: f64,
    pub heading: f64,
    pub satellites: u8,
    pub enabled: bool,
    /// Wall time of the last walk step, for speed
    pub last_update: Option<DateTime<Utc>>,
}

impl GpsState {
    /// Default state parked at `center`
    pub fn at(center: LatLon) -> Self {
        Self {
            position: center,
            altitude: DEFAULT_ALTITUDE_M,
            accuracy: DEFAULT_ACCURACY_M,
            speed: 0.0,
            heading: 0.0,
            satellites: DEFAULT_SATELLITES,
            enabled: true,
            last_update: None,
        }
    }
}

/// Mock GPS receiver
#[derive(Debug)]
pub struct GpsModel<R: Rng = StdRng> {
    area: WalkArea,
    state: GpsState,
    last_snapshot: Option<LocationSnapshot>,
    rng: R,
}

impl GpsModel<StdRng> {
    pub fn new(area: WalkArea) -> Self {
        Self::with_rng(area, StdRng::from_entropy())
    }
}

impl<R: Rng> GpsModel<R> {
    pub fn with_rng(area: WalkArea, rng: R) -> Self {
        Self {
            area,
            state: GpsState::at(area.center),
            last_snapshot: None,
            rng,
        }
    }

    pub fn state(&self) -> &GpsState {
        &self.state
    }

    pub fn area(&self) -> &WalkArea {
        &self.area
    }

    /// Snapshot of the current state stamped at `now`
    pub fn snapshot(&self, now: DateTime<Utc>) -> LocationSnapshot {
        let s = &self.state;
        LocationSnapshot {
            latitude: round_to(s.position.lat, 6),
            longitude: round_to(s.position.lon, 6),
            accuracy: round_to(s.accuracy, 1),
            altitude: Some(round_to(s.altitude, 1)),
            speed: Some(round_to(s.speed, 1)),
            heading: Some(s.heading.round()),
            satellites: Some(s.satellites),
            address: None,
            timestamp: now,
        }
    }

    /// Next position; pulls toward center if the raw step leaves the radius
    fn walk(&mut self) -> LatLon {
        let direction = self.rng.gen_range(0.0..TAU);
        let distance = self.rng.gen_range(0.0..=MAX_STEP_M);
        let candidate = offset(self.state.position, distance, direction);

        if haversine_m(self.area.center, candidate) > self.area.radius_m {
            let fraction = self.rng.gen_range(PULL_BACK_MIN..=PULL_BACK_MAX);
            lerp(self.state.position, self.area.center, fraction)
        } else {
            candidate
        }
    }

    fn jitter_signal(&mut self) {
        let s = &mut self.state;
        s.accuracy = self.rng.gen_range(ACCURACY_RANGE_M.0..=ACCURACY_RANGE_M.1);
        s.satellites = self.rng.gen_range(SATELLITE_RANGE.0..=SATELLITE_RANGE.1);
        s.altitude = (s.altitude + self.rng.gen_range(-ALTITUDE_JITTER_M..=ALTITUDE_JITTER_M)).max(0.0);
    }
}

impl<R: Rng + Send> SensorModel for GpsModel<R> {
    type Snapshot = LocationSnapshot;
    const NAME: &'static str = "gps";

    fn step(&mut self, tick: &Tick) -> LocationSnapshot {
        if !self.state.enabled {
            if let Some(frozen) = &self.last_snapshot {
                return frozen.clone();
            }
            let snapshot = self.snapshot(tick.now);
            self.last_snapshot = Some(snapshot.clone());
            return snapshot;
        }

        let previous = self.state.position;
        let next = self.walk();
        let displacement = haversine_m(previous, next);

        let elapsed_secs = self
            .state
            .last_update
            .map(|last| (tick.now - last).num_milliseconds() as f64 / 1000.0)
            .filter(|secs| *secs > 0.0)
            .unwrap_or_else(|| tick.elapsed.as_secs_f64());

        self.state.position = next;
        self.state.speed = if elapsed_secs > 0.0 { displacement / elapsed_secs } else { 0.0 };
        if displacement > HEADING_MIN_DISPLACEMENT_M {
            self.state.heading = initial_bearing_deg(previous, next);
        }
        self.jitter_signal();
        self.state.last_update = Some(tick.now);

        let snapshot = self.snapshot(tick.now);
        self.last_snapshot = Some(snapshot.clone());
        snapshot
    }

    fn toggle(&mut self) {
        self.state.enabled = !self.state.enabled;
        if self.state.enabled {
            // Speed after an outage is measured from the next step
            self.state.last_update = None;
        }
    }

    fn reset(&mut self) {
        self.state = GpsState::at(self.area.center);
        self.last_snapshot = None;
    }

    fn describe(s: &LocationSnapshot) -> String {
        format!(
            "GPS: {:.6}, {:.6} | ±{:.1}m | {:.1}m/s | {}° | {} sats",
            s.latitude,
            s.longitude,
            s.accuracy,
            s.speed.unwrap_or(0.0),
            s.heading.unwrap_or(0.0),
            s.satellites.unwrap_or(0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Timestamped;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rand::rngs::mock::StepRng;
    use std::time::Duration;

    const CENTER: LatLon = LatLon::new(37.7749, -122.4194);

    fn area(radius_m: f64) -> WalkArea {
        WalkArea {
            center: CENTER,
            radius_m,
        }
    }

    fn seeded(radius_m: f64, seed: u64) -> GpsModel<StdRng> {
        GpsModel::with_rng(area(radius_m), StdRng::seed_from_u64(seed))
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn tick_at(secs: i64) -> Tick {
        Tick::new(Duration::from_secs(30), start() + ChronoDuration::seconds(secs))
    }

    #[test]
    fn test_walk_stays_within_radius() {
        for seed in 0..5 {
            let mut model = seeded(100.0, seed);
            for i in 0..2_000 {
                let s = model.step(&tick_at(i * 30));
                let d = haversine_m(CENTER, LatLon::new(s.latitude, s.longitude));
                assert!(d <= 100.0 + 0.5, "seed {} tick {} escaped to {}m", seed, i, d);
                assert!(haversine_m(CENTER, model.state().position) <= 100.0 + 1e-6);
            }
        }
    }

    #[test]
    fn test_step_length_bounded() {
        let mut model = seeded(10_000.0, 7);
        let mut previous = CENTER;
        for i in 0..500 {
            model.step(&tick_at(i * 30));
            let position = model.state().position;
            assert!(haversine_m(previous, position) <= MAX_STEP_M + 0.5);
            previous = position;
        }
    }

    #[test]
    fn test_speed_from_wall_time() {
        let mut model = seeded(10_000.0, 3);
        model.step(&tick_at(0));
        let before = model.state().position;

        model.step(&tick_at(10));
        let after = model.state().position;

        let expected = haversine_m(before, after) / 10.0;
        assert!((model.state().speed - expected).abs() < 1e-9);
    }

    #[test]
    fn test_heading_kept_when_at_rest() {
        // All-zero rng: zero-length steps
        let mut model = GpsModel::with_rng(area(500.0), StepRng::new(0, 0));
        model.state.heading = 123.0;

        let s = model.step(&tick_at(0));
        assert_eq!(s.heading, Some(123.0));
        assert_eq!(s.speed, Some(0.0));
        assert_eq!(s.latitude, round_to(CENTER.lat, 6));
    }

    #[test]
    fn test_signal_fields_in_range() {
        let mut model = seeded(500.0, 11);
        for i in 0..500 {
            let s = model.step(&tick_at(i * 30));
            assert!((5.0..=50.0).contains(&s.accuracy));
            assert!((6..=12).contains(&s.satellites.unwrap()));
            assert!(s.altitude.unwrap() >= 0.0);
            assert!((0.0..=360.0).contains(&s.heading.unwrap()));
        }
    }

    #[test]
    fn test_snapshot_precision() {
        let mut model = seeded(500.0, 5);
        let s = model.step(&tick_at(0));

        assert_eq!(s.latitude, round_to(s.latitude, 6));
        assert_eq!(s.longitude, round_to(s.longitude, 6));
        assert_eq!(s.accuracy, round_to(s.accuracy, 1));
        assert_eq!(s.heading.unwrap().fract(), 0.0);
    }

    #[test]
    fn test_disabled_republishes_frozen_snapshot() {
        let mut model = seeded(500.0, 9);
        let last = model.step(&tick_at(0));

        model.toggle();
        assert!(!model.state().enabled);

        let frozen = model.step(&tick_at(30));
        let later = model.step(&tick_at(300));
        assert_eq!(frozen, last);
        assert_eq!(later, last);
        assert!(later.is_stale(start() + ChronoDuration::seconds(300)));
    }

    #[test]
    fn test_reenable_resumes_walk() {
        let mut model = seeded(500.0, 9);
        model.step(&tick_at(0));
        model.toggle();
        model.step(&tick_at(30));
        model.toggle();

        let resumed = model.step(&tick_at(60));
        assert_eq!(resumed.timestamp, start() + ChronoDuration::seconds(60));
    }

    #[test]
    fn test_reset_restores_center() {
        let mut model = seeded(500.0, 2);
        for i in 0..50 {
            model.step(&tick_at(i * 30));
        }
        model.toggle();
        model.reset();

        let state = model.state();
        assert_eq!(state, &GpsState::at(CENTER));
        assert_eq!(state.speed, 0.0);
        assert_eq!(state.heading, 0.0);
        assert!(state.enabled);
    }

    #[test]
    fn test_describe() {
        let model = seeded(500.0, 1);
        let line = GpsModel::<StdRng>::describe(&model.snapshot(start()));
        assert_eq!(line, "GPS: 37.774900, -122.419400 | ±10.0m | 0.0m/s | 0° | 8 sats");
    }
}
