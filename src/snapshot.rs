//! # Sensor Snapshots
//!
//! JSON snapshot shapes shared with the dashboard, plus the staleness contract
//! consumers apply when reading them.
//!
//! | Sensor | File field | Type |
//! |--------|------------|------|
//! | Battery | `timestamp` | unix milliseconds (number) |
//! | Location | `timestamp` | ISO-8601 UTC string, millisecond precision |

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

use crate::error::Result;

/// Maximum snapshot age in milliseconds before it is treated as unavailable
pub const STALE_AFTER_MS: i64 = 120_000;

/// Battery charge state as reported to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatteryStatus {
    Charging,
    Discharging,
    Full,
    Unknown,
}

/// One battery reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySnapshot {
    /// State of charge in percent (0-100, one decimal)
    pub capacity: f64,
    /// Cell voltage in volts (two decimals)
    pub voltage: f64,
    /// Current in milliamps, positive while charging
    pub current: i32,
    pub status: BatteryStatus,
    /// Cell temperature in °C (one decimal)
    pub temperature: f64,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
}

/// One location fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Ground speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Heading in degrees (0-360)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub satellites: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
}

/// Snapshots that carry a capture time
pub trait Timestamped {
    /// Capture time as unix milliseconds
    fn timestamp_millis(&self) -> i64;

    /// Age of the snapshot relative to `now`
    fn age_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.timestamp_millis()
    }

    /// Whether the snapshot must be treated as absent
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_millis(now) > STALE_AFTER_MS
    }
}

impl Timestamped for BatterySnapshot {
    fn timestamp_millis(&self) -> i64 {
        self.timestamp
    }
}

impl Timestamped for LocationSnapshot {
    fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Read a snapshot file the way the dashboard does
///
/// Returns `Ok(None)` when the file does not exist or the snapshot is stale.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or decoded
pub fn read_fresh<T, P>(path: P, now: DateTime<Utc>) -> Result<Option<T>>
where
    T: DeserializeOwned + Timestamped,
    P: AsRef<Path>,
{
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let snapshot: T = serde_json::from_str(&contents)?;
    if snapshot.is_stale(now) {
        return Ok(None);
    }
    Ok(Some(snapshot))
}

/// `DateTime<Utc>` as `2024-05-01T12:00:00.000Z`
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
