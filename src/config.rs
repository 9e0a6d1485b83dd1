//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files, with
//! environment overrides applied by the process launcher.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `YOYOPOD_CONFIG` | path of the TOML file (optional) |
//! | `BATTERY_FILE` | `battery.path` |
//! | `GPS_FILE` | `gps.path` |
//! | `UPDATE_INTERVAL_MS` | `battery.interval_ms` and `gps.interval_ms` |
//! | `CHARGE_RATE` | `battery.charge_rate` |
//! | `DISCHARGE_RATE` | `battery.discharge_rate` |
//! | `GPS_CENTER_LAT` | `gps.center_lat` |
//! | `GPS_CENTER_LON` | `gps.center_lon` |
//! | `GPS_RADIUS_M` | `gps.radius_m` |
//! | `MIC_RELAY_BIND` | `relay.bind` |
//! | `MIC_DEVICE` | `relay.device` |
//! | `LOG_LEVEL` | `logging.level` |
//! | `LOG_DIR` | `logging.dir` |

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SimError};
use crate::relay::capture::CaptureSettings;
use crate::sim::battery::BatteryRates;
use crate::sim::geo::LatLon;
use crate::sim::gps::WalkArea;

/// Environment variable naming the TOML file
pub const CONFIG_PATH_ENV: &str = "YOYOPOD_CONFIG";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub battery: BatteryConfig,
    #[serde(default)]
    pub gps: GpsConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Battery simulator configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BatteryConfig {
    #[serde(default = "default_battery_path")]
    pub path: String,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Percent per minute while charging
    #[serde(default = "default_charge_rate")]
    pub charge_rate: f64,

    /// Percent per minute while discharging
    #[serde(default = "default_discharge_rate")]
    pub discharge_rate: f64,
}

/// GPS simulator configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GpsConfig {
    #[serde(default = "default_gps_path")]
    pub path: String,

    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_center_lat")]
    pub center_lat: f64,

    #[serde(default = "default_center_lon")]
    pub center_lon: f64,

    #[serde(default = "default_radius_m")]
    pub radius_m: f64,
}

/// Microphone relay configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RelayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_program")]
    pub program: String,

    /// ALSA capture device; `arecord` default when unset
    #[serde(default)]
    pub device: Option<String>,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_chunk_bytes")]
    pub chunk_bytes: usize,

    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default = "default_readiness_ms")]
    pub readiness_ms: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily log files; stdout only when unset
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_battery_path() -> String { "/tmp/yoyopod/battery.json".to_string() }
fn default_gps_path() -> String { "/tmp/yoyopod/location.json".to_string() }
fn default_interval_ms() -> u64 { 30_000 }
fn default_charge_rate() -> f64 { 1.0 }
fn default_discharge_rate() -> f64 { 0.5 }

fn default_center_lat() -> f64 { 37.7749 }
fn default_center_lon() -> f64 { -122.4194 }
fn default_radius_m() -> f64 { 500.0 }

fn default_bind() -> String { "0.0.0.0:8081".to_string() }
fn default_program() -> String { "arecord".to_string() }
fn default_sample_rate() -> u32 { 16_000 }
fn default_chunk_bytes() -> usize { 3_200 }
fn default_queue_depth() -> usize { 64 }
fn default_readiness_ms() -> u64 { 200 }

fn default_log_level() -> String { "info".to_string() }

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            path: default_battery_path(),
            interval_ms: default_interval_ms(),
            charge_rate: default_charge_rate(),
            discharge_rate: default_discharge_rate(),
        }
    }
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            path: default_gps_path(),
            interval_ms: default_interval_ms(),
            center_lat: default_center_lat(),
            center_lon: default_center_lon(),
            radius_m: default_radius_m(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            program: default_program(),
            device: None,
            sample_rate: default_sample_rate(),
            chunk_bytes: default_chunk_bytes(),
            queue_depth: default_queue_depth(),
            readiness_ms: default_readiness_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

impl BatteryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn rates(&self) -> BatteryRates {
        BatteryRates {
            charge_per_min: self.charge_rate,
            discharge_per_min: self.discharge_rate,
        }
    }
}

impl GpsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn area(&self) -> WalkArea {
        WalkArea {
            center: LatLon::new(self.center_lat, self.center_lon),
            radius_m: self.radius_m,
        }
    }
}

impl RelayConfig {
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            program: self.program.clone(),
            device: self.device.clone(),
            sample_rate: self.sample_rate,
            channels: 1,
            chunk_bytes: self.chunk_bytes,
            readiness: Duration::from_millis(self.readiness_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use yoyopod_sim::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file named by `YOYOPOD_CONFIG` (defaults when unset), then
    /// apply environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable, an override does not parse,
    /// or the result fails validation
    pub fn from_environment() -> Result<Self> {
        Self::resolve(|key| std::env::var(key).ok())
    }

    /// [`Config::from_environment`] with an explicit variable lookup
    pub fn resolve<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => {
                let contents = fs::read_to_string(&path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("BATTERY_FILE") {
            self.battery.path = path;
        }
        if let Some(path) = lookup("GPS_FILE") {
            self.gps.path = path;
        }
        if let Some(ms) = parse_var::<u64, _>(lookup, "UPDATE_INTERVAL_MS")? {
            self.battery.interval_ms = ms;
            self.gps.interval_ms = ms;
        }
        if let Some(rate) = parse_var::<f64, _>(lookup, "CHARGE_RATE")? {
            self.battery.charge_rate = rate;
        }
        if let Some(rate) = parse_var::<f64, _>(lookup, "DISCHARGE_RATE")? {
            self.battery.discharge_rate = rate;
        }
        if let Some(lat) = parse_var::<f64, _>(lookup, "GPS_CENTER_LAT")? {
            self.gps.center_lat = lat;
        }
        if let Some(lon) = parse_var::<f64, _>(lookup, "GPS_CENTER_LON")? {
            self.gps.center_lon = lon;
        }
        if let Some(radius) = parse_var::<f64, _>(lookup, "GPS_RADIUS_M")? {
            self.gps.radius_m = radius;
        }
        if let Some(bind) = lookup("MIC_RELAY_BIND") {
            self.relay.bind = bind;
        }
        if let Some(device) = lookup("MIC_DEVICE") {
            self.relay.device = Some(device);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.dir = Some(dir);
        }
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.battery.path.is_empty() || self.gps.path.is_empty() {
            return Err(invalid("snapshot paths cannot be empty"));
        }

        for (name, ms) in [
            ("battery.interval_ms", self.battery.interval_ms),
            ("gps.interval_ms", self.gps.interval_ms),
        ] {
            if !(1_000..=3_600_000).contains(&ms) {
                return Err(invalid(format!("{} must be between 1000 and 3600000", name)));
            }
        }

        for (name, rate) in [
            ("charge_rate", self.battery.charge_rate),
            ("discharge_rate", self.battery.discharge_rate),
        ] {
            if !(rate > 0.0 && rate <= 100.0) {
                return Err(invalid(format!("{} must be greater than 0 and at most 100", name)));
            }
        }

        if !(-90.0..=90.0).contains(&self.gps.center_lat) {
            return Err(invalid("center_lat must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.gps.center_lon) {
            return Err(invalid("center_lon must be between -180 and 180"));
        }

        if !(self.gps.radius_m > 0.0) {
            return Err(invalid("radius_m must be greater than 0"));
        }

        if self.relay.bind.is_empty() || self.relay.program.is_empty() {
            return Err(invalid("relay bind and program cannot be empty"));
        }

        if self.relay.chunk_bytes == 0 || self.relay.queue_depth == 0 {
            return Err(invalid("chunk_bytes and queue_depth must be greater than 0"));
        }

        if self.relay.readiness_ms > 10_000 {
            return Err(invalid("readiness_ms must be at most 10000"));
        }

        if self.logging.level.is_empty() {
            return Err(invalid("logging level cannot be empty"));
        }

        Ok(())
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> SimError {
    SimError::Config(toml::de::Error::custom(msg))
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| invalid(format!("{}={:?} is invalid: {}", key, raw, e))),
    }
}
