//! # Atomic Snapshot Publisher
//!
//! Writes snapshots with write-temp-then-rename so a reader opening the target
//! path always sees either the previous complete file or the new one.
//!
//! This module handles:
//! - Creating the snapshot directory
//! - Serializing snapshots to JSON
//! - Writing `<path>.tmp` and renaming it over `<path>`

use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Result, SimError};

/// Suffix appended to the target path for the in-flight file
pub const TEMP_SUFFIX: &str = ".tmp";

/// Publishes snapshots to a single well-known path
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    path: PathBuf,
    temp_path: PathBuf,
}

impl SnapshotPublisher {
    /// Create a publisher for `path`
    ///
    /// # Examples
    ///
    /// ```
    /// use yoyopod_sim::publish::SnapshotPublisher;
    ///
    /// let publisher = SnapshotPublisher::new("/tmp/yoyopod/battery.json");
    /// assert_eq!(publisher.temp_path().to_str(), Some("/tmp/yoyopod/battery.json.tmp"));
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut temp: OsString = path.clone().into_os_string();
        temp.push(TEMP_SUFFIX);

        Self {
            path,
            temp_path: PathBuf::from(temp),
        }
    }

    /// Target path readers open
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temporary path used while writing
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Create the parent directory
    ///
    /// Called once at startup; failure here is fatal for the simulator.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub async fn prepare(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Atomically replace the snapshot file
    ///
    /// # Errors
    ///
    /// Returns error if serialization, the temp write, or the rename fails.
    /// In every case the previously published file is left as it was.
    pub async fn publish<T: Serialize>(&self, snapshot: &T) -> Result<()> {
        self.prepare().await?;
        let len = self.stage(snapshot).await?;
        self.commit().await?;

        debug!("Published snapshot to {} ({} bytes)", self.path.display(), len);
        Ok(())
    }

    /// Write the serialized snapshot to the temp path
    async fn stage<T: Serialize>(&self, snapshot: &T) -> Result<usize> {
        let json = serde_json::to_string(snapshot)?;
        tokio::fs::write(&self.temp_path, json.as_bytes()).await?;
        Ok(json.len())
    }

    /// Rename the staged file over the target
    async fn commit(&self) -> Result<()> {
        if let Err(source) = tokio::fs::rename(&self.temp_path, &self.path).await {
            if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {}: {}", self.temp_path.display(), e);
                }
            }
            return Err(SimError::Publish {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }
}
