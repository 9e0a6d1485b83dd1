//! Capture process abstraction for the microphone relay

use async_trait::async_trait;
use bytes::Bytes;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::error::{Result, SimError};

/// How long a terminated capture process gets before it is killed
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Starts capture processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptureSpawner: Send + Sync {
    /// Start a capture process and confirm it is running
    async fn spawn(&self) -> Result<Box<dyn CaptureProcess>>;
}

/// A running capture process producing raw PCM
#[async_trait]
pub trait CaptureProcess: Send {
    /// Next chunk of audio; `None` once the process output ends
    async fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>>;

    /// Stop the process gracefully
    async fn terminate(&mut self) -> Result<()>;
}

/// Capture process settings
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Capture program, normally `arecord`
    pub program: String,
    /// ALSA device passed with `-D`, if any
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u8,
    /// Read size per chunk
    pub chunk_bytes: usize,
    /// Delay before checking that the process survived startup
    pub readiness: Duration,
}

impl CaptureSettings {
    /// Command-line arguments for `arecord`: S16_LE raw PCM on stdout
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-q".to_string(),
            "-t".to_string(),
            "raw".to_string(),
            "-f".to_string(),
            "S16_LE".to_string(),
            "-c".to_string(),
            self.channels.to_string(),
            "-r".to_string(),
            self.sample_rate.to_string(),
        ];
        if let Some(device) = &self.device {
            args.push("-D".to_string());
            args.push(device.clone());
        }
        args.push("-".to_string());
        args
    }
}

/// Spawns `arecord` (or a compatible program) with piped stdout
#[derive(Debug, Clone)]
pub struct ArecordSpawner {
    settings: CaptureSettings,
}

impl ArecordSpawner {
    pub fn new(settings: CaptureSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl CaptureSpawner for ArecordSpawner {
    async fn spawn(&self) -> Result<Box<dyn CaptureProcess>> {
        let args = self.settings.args();
        debug!("Spawning {} {}", self.settings.program, args.join(" "));

        let mut child = Command::new(&self.settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SimError::CaptureSpawn(format!("Failed to start {}: {}", self.settings.program, e))
            })?;

        tokio::time::sleep(self.settings.readiness).await;
        if let Some(status) = child.try_wait()? {
            return Err(SimError::CaptureSpawn(format!(
                "{} exited during startup ({})",
                self.settings.program, status
            )));
        }

        let stdout = child.stdout.take().ok_or_else(|| {
            SimError::CaptureSpawn(format!("{} has no stdout pipe", self.settings.program))
        })?;

        info!("Capture process started (pid {:?})", child.id());
        Ok(Box::new(ChildCapture {
            child,
            stdout,
            buf: vec![0u8; self.settings.chunk_bytes],
        }))
    }
}

/// `arecord` child process
struct ChildCapture {
    child: Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
}

#[async_trait]
impl CaptureProcess for ChildCapture {
    async fn next_chunk(&mut self) -> Option<std::io::Result<Bytes>> {
        match self.stdout.read(&mut self.buf).await {
            Ok(0) => None,
            Ok(n) => Some(Ok(Bytes::copy_from_slice(&self.buf[..n]))),
            Err(e) => Some(Err(e)),
        }
    }

    async fn terminate(&mut self) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        if let Some(pid) = self.child.id() {
            // SAFETY: pid belongs to a child we own and have not reaped yet
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                warn!("SIGTERM to capture pid {} failed: {}", pid, std::io::Error::last_os_error());
            }
        }

        match tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await {
            Ok(status) => {
                debug!("Capture process exited: {}", status?);
                Ok(())
            }
            Err(_) => {
                warn!("Capture process ignored SIGTERM, killing");
                self.child.kill().await?;
                Ok(())
            }
        }
    }
}
