//! # Operator Control
//!
//! Maps process signals onto [`Control`] commands consumed by the simulator loop.
//!
//! | Signal | Command |
//! |--------|---------|
//! | SIGUSR1 | [`Control::Toggle`] |
//! | SIGUSR2 | [`Control::Reset`] |
//! | SIGTERM, SIGINT | [`Control::Shutdown`] |
//!
//! A second SIGTERM/SIGINT after the first exits the process immediately with
//! [`FORCED_EXIT_CODE`], without waiting for the final snapshot.

use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Depth of the control queue
pub const CONTROL_QUEUE_DEPTH: usize = 16;

/// Exit status when shutdown is requested twice
pub const FORCED_EXIT_CODE: i32 = 130;

/// Operator command applied between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Flip charging (battery) or enabled (GPS)
    Toggle,
    /// Restore the default state
    Reset,
    /// Publish one final snapshot and stop
    Shutdown,
}

/// Create the control channel
pub fn channel() -> (mpsc::Sender<Control>, mpsc::Receiver<Control>) {
    mpsc::channel(CONTROL_QUEUE_DEPTH)
}

/// Forward process signals into `tx`
///
/// The listener keeps running after the first shutdown request so a repeated
/// one can force the process down.
///
/// # Errors
///
/// Returns error if a signal handler cannot be installed
pub fn listen_for_signals(tx: mpsc::Sender<Control>) -> Result<JoinHandle<()>> {
    let mut toggle = signal(SignalKind::user_defined1())?;
    let mut reset = signal(SignalKind::user_defined2())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        let mut shutdown_requested = false;
        loop {
            let command = next_command(&mut toggle, &mut reset, &mut terminate, &mut interrupt).await;
            info!("Received {:?} signal", command);

            match dispatch(command, &mut shutdown_requested) {
                Dispatch::Forward(command) => {
                    if tx.send(command).await.is_err() {
                        debug!("Control receiver dropped, signal listener exiting");
                        break;
                    }
                }
                Dispatch::ForceExit => {
                    warn!("Shutdown requested again, exiting without final snapshot");
                    std::process::exit(FORCED_EXIT_CODE);
                }
            }
        }
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Forward(Control),
    ForceExit,
}

fn dispatch(command: Control, shutdown_requested: &mut bool) -> Dispatch {
    match command {
        Control::Shutdown if *shutdown_requested => Dispatch::ForceExit,
        Control::Shutdown => {
            *shutdown_requested = true;
            Dispatch::Forward(command)
        }
        other => Dispatch::Forward(other),
    }
}

async fn next_command(
    toggle: &mut Signal,
    reset: &mut Signal,
    terminate: &mut Signal,
    interrupt: &mut Signal,
) -> Control {
    tokio::select! {
        _ = toggle.recv() => Control::Toggle,
        _ = reset.recv() => Control::Reset,
        _ = terminate.recv() => Control::Shutdown,
        _ = interrupt.recv() => Control::Shutdown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_second_shutdown_forces_exit() {
        let mut requested = false;
        assert_eq!(
            dispatch(Control::Shutdown, &mut requested),
            Dispatch::Forward(Control::Shutdown)
        );
        assert!(requested);
        assert_eq!(dispatch(Control::Shutdown, &mut requested), Dispatch::ForceExit);
    }

    #[test]
    fn test_toggle_and_reset_forwarded_after_shutdown() {
        let mut requested = true;
        assert_eq!(
            dispatch(Control::Toggle, &mut requested),
            Dispatch::Forward(Control::Toggle)
        );
        assert_eq!(
            dispatch(Control::Reset, &mut requested),
            Dispatch::Forward(Control::Reset)
        );
    }

    // Signal delivery is process-wide, so every raised signal lives in this one test
    #[tokio::test]
    async fn test_signals_map_to_commands_and_listener_keeps_running() {
        let (tx, mut rx) = channel();
        let listener = listen_for_signals(tx).unwrap();

        for (signal, expected) in [
            (libc::SIGUSR1, Control::Toggle),
            (libc::SIGUSR2, Control::Reset),
            (libc::SIGUSR2, Control::Reset),
        ] {
            unsafe {
                libc::raise(signal);
            }
            let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("signal not delivered");
            assert_eq!(command, Some(expected));
        }
        assert!(!listener.is_finished());
    }
}
