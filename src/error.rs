//! # Error Types
//!
//! Custom error types for the YoyoPod simulators using `thiserror`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the simulators and the microphone relay
#[derive(Debug, Error)]
pub enum SimError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot publish failed; the previous file at `path` is still intact
    #[error("Failed to publish snapshot to {}: {source}", path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Capture process could not be started
    #[error("Capture spawn error: {0}")]
    CaptureSpawn(String),

    /// Capture process failed while running
    #[error("Capture error: {0}")]
    Capture(String),
}

/// Result type alias for the simulators
pub type Result<T> = std::result::Result<T, SimError>;
