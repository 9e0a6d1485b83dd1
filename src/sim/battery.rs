//! # Battery Model
//!
//! Linear charge/discharge model for the mock battery.
//!
//! ## Charging Current Policy
//!
//! | Capacity | Current |
//! |----------|---------|
//! | < 80% | +500 mA |
//! | 80-95% | +300 mA |
//! | >= 95% | +100 mA (trickle) |
//! | discharging | -200 mA |
//!
//! ## Auto Plug-In
//!
//! Once capacity drops to 15% or below while discharging, the model switches
//! itself to charging. Real hardware does not do this; the mock keeps the
//! dashboard from sitting at an empty battery forever. The switch takes effect
//! from the next tick: status, current and temperature of the crossing tick
//! all still follow the discharging state.

use super::geo::round_to;
use super::{SensorModel, Tick};
use crate::snapshot::{BatterySnapshot, BatteryStatus};

/// Capacity at which the mock plugs itself in
pub const AUTO_CHARGE_THRESHOLD: f64 = 15.0;

/// Cell voltage at 0%
pub const VOLTAGE_EMPTY: f64 = 3.0;
/// Cell voltage at 100%
pub const VOLTAGE_FULL: f64 = 4.2;

/// Ambient temperature in °C
pub const TEMP_AMBIENT: f64 = 25.0;
/// Temperature target while charging
pub const TEMP_CHARGING: f64 = 35.0;
/// Temperature target while discharging from a warm cell
pub const TEMP_WARM: f64 = 30.0;
/// Maximum temperature change per tick
pub const TEMP_STEP: f64 = 0.5;

/// Discharge load in mA
pub const DISCHARGE_CURRENT_MA: i32 = -200;

/// Charge/discharge rates in percent per minute
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryRates {
    pub charge_per_min: f64,
    pub discharge_per_min: f64,
}

impl Default for BatteryRates {
    fn default() -> Self {
        Self {
            charge_per_min: 1.0,
            discharge_per_min: 0.5,
        }
    }
}

/// In-memory battery state
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryState {
    pub capacity: f64,
    pub is_charging: bool,
    pub voltage: f64,
    pub temperature: f64,
}

impl Default for BatteryState {
    fn default() -> Self {
        Self {
            capacity: 85.0,
            is_charging: false,
            voltage: 3.9,
            temperature: TEMP_AMBIENT,
        }
    }
}

/// Mock battery
#[derive(Debug, Clone)]
pub struct BatteryModel {
    state: BatteryState,
    rates: BatteryRates,
}

impl BatteryModel {
    pub fn new(rates: BatteryRates) -> Self {
        Self {
            state: BatteryState::default(),
            rates,
        }
    }

    /// Start from an arbitrary state
    pub fn with_state(rates: BatteryRates, state: BatteryState) -> Self {
        Self { state, rates }
    }

    pub fn state(&self) -> &BatteryState {
        &self.state
    }

    /// Snapshot of the current state without stepping
    pub fn snapshot(&self, timestamp_ms: i64) -> BatterySnapshot {
        self.snapshot_as(self.state.is_charging, timestamp_ms)
    }

    fn snapshot_as(&self, is_charging: bool, timestamp_ms: i64) -> BatterySnapshot {
        let state = BatteryState {
            is_charging,
            ..self.state.clone()
        };
        BatterySnapshot {
            capacity: round_to(state.capacity, 1),
            voltage: round_to(state.voltage, 2),
            current: charge_current(&state),
            status: status_of(&state),
            temperature: round_to(state.temperature, 1),
            timestamp: timestamp_ms,
        }
    }

    fn advance_capacity(&mut self, minutes: f64) {
        let s = &mut self.state;
        if s.is_charging {
            s.capacity = (s.capacity + self.rates.charge_per_min * minutes).min(100.0);
        } else {
            s.capacity = (s.capacity - self.rates.discharge_per_min * minutes).max(0.0);
            if s.capacity <= AUTO_CHARGE_THRESHOLD {
                s.is_charging = true;
            }
        }
    }

    fn advance_temperature(&mut self, is_charging: bool) {
        let s = &mut self.state;
        let target = if is_charging {
            TEMP_CHARGING
        } else if s.temperature > TEMP_WARM {
            TEMP_WARM
        } else {
            TEMP_AMBIENT
        };

        s.temperature = if s.temperature < target {
            (s.temperature + TEMP_STEP).min(target)
        } else {
            (s.temperature - TEMP_STEP).max(target)
        };
    }
}

impl SensorModel for BatteryModel {
    type Snapshot = BatterySnapshot;
    const NAME: &'static str = "battery";

    fn step(&mut self, tick: &Tick) -> BatterySnapshot {
        // The whole tick runs on the flag it started with; an auto plug-in
        // applies from the next one.
        let was_charging = self.state.is_charging;
        self.advance_capacity(tick.elapsed_minutes());
        self.state.voltage = voltage_for(self.state.capacity);
        self.advance_temperature(was_charging);

        self.snapshot_as(was_charging, tick.now.timestamp_millis())
    }

    fn toggle(&mut self) {
        self.state.is_charging = !self.state.is_charging;
    }

    fn reset(&mut self) {
        self.state = BatteryState::default();
    }

    fn describe(s: &BatterySnapshot) -> String {
        format!(
            "Battery: {:.1}% | {:.2}V | {}mA | {:?} | {:.1}°C",
            s.capacity, s.voltage, s.current, s.status, s.temperature
        )
    }
}

/// Voltage by linear interpolation between empty and full
pub fn voltage_for(capacity: f64) -> f64 {
    VOLTAGE_EMPTY + (VOLTAGE_FULL - VOLTAGE_EMPTY) * (capacity.clamp(0.0, 100.0) / 100.0)
}

fn charge_current(state: &BatteryState) -> i32 {
    if !state.is_charging {
        DISCHARGE_CURRENT_MA
    } else if state.capacity < 80.0 {
        500
    } else if state.capacity < 95.0 {
        300
    } else {
        100
    }
}

fn status_of(state: &BatteryState) -> BatteryStatus {
    if state.is_charging && state.capacity >= 100.0 {
        BatteryStatus::Full
    } else if state.is_charging {
        BatteryStatus::Charging
    } else {
        BatteryStatus::Discharging
    }
}
