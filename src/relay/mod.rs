//! # Microphone Relay Module
//!
//! Shares one capture process among any number of live subscribers.
//!
//! ## Lifecycle
//!
//! ```text
//!   Idle ──first join──▶ Capturing ──last leave──▶ Idle
//!                          │
//!                          └─capture exits─▶ all sessions closed ─▶ Idle
//! ```
//!
//! Every chunk read from the capture process is offered to each session's
//! bounded queue with `try_send`. A full queue drops that chunk for that
//! session only; the pump never waits on a subscriber.
//!
//! At most one capture process exists at a time. Each pump holds the single
//! capture slot until its process has been terminated, so a subscriber that
//! arrives while the previous capture is still shutting down waits for it
//! before a new process is spawned.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub mod capture;
pub mod server;

use crate::error::{Result, SimError};
use capture::{CaptureProcess, CaptureSpawner};

/// Opaque subscriber identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A joined subscriber
///
/// `chunks` yields raw PCM exactly as the capture process produced it and
/// returns `None` once the relay closes the session.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub chunks: mpsc::Receiver<Bytes>,
}

/// Running capture process owned by its pump task
struct ActiveCapture {
    generation: u64,
    stop: oneshot::Sender<()>,
    pump: JoinHandle<()>,
}

impl ActiveCapture {
    /// Ask the pump to terminate the process and wait for it
    async fn stop(self) {
        // Err means the pump already finished on its own
        let _ = self.stop.send(());
        if let Err(e) = self.pump.await {
            error!("Capture pump task failed: {}", e);
        }
    }
}

#[derive(Default)]
struct RelayState {
    sessions: HashMap<SessionId, mpsc::Sender<Bytes>>,
    capture: Option<ActiveCapture>,
    generation: u64,
}

impl RelayState {
    /// Take the capture handle if it still belongs to `generation`
    fn take_capture(&mut self, generation: u64) -> Option<ActiveCapture> {
        match &self.capture {
            Some(active) if active.generation == generation => self.capture.take(),
            _ => None,
        }
    }
}

/// Fan-out relay from one capture source to many sessions
#[derive(Clone)]
pub struct MicRelay {
    state: Arc<Mutex<RelayState>>,
    spawner: Arc<dyn CaptureSpawner>,
    capture_slot: Arc<Semaphore>,
    /// Serializes joins so only one of them can start a capture
    joining: Arc<Mutex<()>>,
    next_id: Arc<AtomicU64>,
    queue_depth: usize,
}

impl fmt::Debug for MicRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MicRelay")
            .field("queue_depth", &self.queue_depth)
            .finish_non_exhaustive()
    }
}

impl MicRelay {
    /// Create an idle relay
    ///
    /// `queue_depth` is the number of chunks buffered per session before
    /// chunks are dropped for it.
    pub fn new(spawner: Arc<dyn CaptureSpawner>, queue_depth: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(RelayState::default())),
            spawner,
            capture_slot: Arc::new(Semaphore::new(1)),
            joining: Arc::new(Mutex::new(())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_depth: queue_depth.max(1),
        }
    }

    /// Register a subscriber, starting capture if it is the first
    ///
    /// # Errors
    ///
    /// Returns error if the capture process cannot be started; the
    /// subscriber is not admitted in that case.
    ///
    /// When the previous capture is still terminating, this waits for it to
    /// exit before spawning.
    pub async fn join(&self) -> Result<Session> {
        let _joining = self.joining.lock().await;
        let mut state = self.state.lock().await;

        if state.capture.is_none() {
            // A stopping pump may still need the state lock before it exits
            drop(state);
            let slot = Arc::clone(&self.capture_slot)
                .acquire_owned()
                .await
                .map_err(|_| SimError::CaptureSpawn("capture slot closed".to_string()))?;
            state = self.state.lock().await;

            // Holding the slot means no earlier capture process is alive
            let process = self.spawner.spawn().await.map_err(|e| {
                error!("Microphone capture failed to start: {}", e);
                e
            })?;

            state.generation += 1;
            let generation = state.generation;
            let (stop_tx, stop_rx) = oneshot::channel();
            let pump = tokio::spawn(pump(
                process,
                Arc::clone(&self.state),
                generation,
                stop_rx,
                slot,
            ));
            state.capture = Some(ActiveCapture {
                generation,
                stop: stop_tx,
                pump,
            });
            info!("Microphone capture started (generation {})", generation);
        }

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.queue_depth);
        state.sessions.insert(id, tx);
        info!("{} joined ({} subscribers)", id, state.sessions.len());

        Ok(Session { id, chunks: rx })
    }

    /// Deregister a subscriber, stopping capture if it was the last
    ///
    /// Leaving twice, or leaving after the relay closed the session, is a no-op.
    pub async fn leave(&self, id: SessionId) {
        let stopping = {
            let mut state = self.state.lock().await;
            if state.sessions.remove(&id).is_none() {
                debug!("{} already gone", id);
                return;
            }
            info!("{} left ({} subscribers)", id, state.sessions.len());

            if state.sessions.is_empty() {
                state.capture.take()
            } else {
                None
            }
        };

        if let Some(active) = stopping {
            info!("Last subscriber left, stopping microphone capture");
            active.stop().await;
        }
    }

    /// Stop capture and close every session
    ///
    /// Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let (stopping, closed) = {
            let mut state = self.state.lock().await;
            let closed = state.sessions.len();
            state.sessions.clear();
            (state.capture.take(), closed)
        };

        if closed > 0 {
            info!("Closed {} microphone sessions", closed);
        }
        if let Some(active) = stopping {
            active.stop().await;
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.sessions.len()
    }

    pub async fn is_capturing(&self) -> bool {
        self.state.lock().await.capture.is_some()
    }
}

/// Read chunks from `process` and fan them out until stopped
///
/// `slot` is released only after the process has been terminated or has
/// exited on its own.
async fn pump(
    mut process: Box<dyn CaptureProcess>,
    state: Arc<Mutex<RelayState>>,
    generation: u64,
    mut stop: oneshot::Receiver<()>,
    slot: OwnedSemaphorePermit,
) {
    loop {
        let chunk = tokio::select! {
            _ = &mut stop => {
                terminate(process.as_mut()).await;
                break;
            }
            chunk = process.next_chunk() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                let mut state = state.lock().await;
                broadcast(&mut state.sessions, bytes);

                if state.sessions.is_empty() {
                    // Every remaining transport closed under us
                    if state.take_capture(generation).is_some() {
                        drop(state);
                        info!("No live subscribers remain, stopping microphone capture");
                        terminate(process.as_mut()).await;
                        break;
                    }
                }
            }
            Some(Err(e)) => {
                capture_lost(&state, generation, SimError::Capture(format!("read failed: {}", e))).await;
                terminate(process.as_mut()).await;
                break;
            }
            None => {
                capture_lost(&state, generation, SimError::Capture("process exited".to_string())).await;
                break;
            }
        }
    }

    drop(process);
    drop(slot);
}

/// Offer `chunk` to every session, dropping sessions whose receiver is gone
fn broadcast(sessions: &mut HashMap<SessionId, mpsc::Sender<Bytes>>, chunk: Bytes) {
    sessions.retain(|id, tx| match tx.try_send(chunk.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("{} is behind, dropping chunk", id);
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            info!("{} transport closed", id);
            false
        }
    });
}

async fn capture_lost(state: &Mutex<RelayState>, generation: u64, reason: SimError) {
    let mut state = state.lock().await;
    if state.take_capture(generation).is_none() {
        // Already being stopped by leave/shutdown
        return;
    }

    let closed = state.sessions.len();
    state.sessions.clear();
    error!(
        "Microphone capture ended unexpectedly ({}), closed {} sessions",
        reason, closed
    );
}

async fn terminate(process: &mut dyn CaptureProcess) {
    if let Err(e) = process.terminate().await {
        warn!("Failed to terminate capture process: {}", e);
    }
}
