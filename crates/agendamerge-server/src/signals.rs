//! Process signals for the scheduling daemon.
//!
//! - SIGTERM/SIGINT: stop the scheduler
//! - SIGHUP: run the merge now
//!
//! SIGHUP is the trigger a web server or cron job can use without any IPC:
//! `kill -HUP <pid>`.

use std::io;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::scheduler::SchedulerHandle;

/// Forwards process signals to the scheduler until it stops.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed.
#[cfg(unix)]
pub fn spawn_signal_listener(handle: SchedulerHandle) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, stopping");
                    let _ = handle.stop().await;
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, stopping");
                    let _ = handle.stop().await;
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, merging now");
                    if handle.sync_now().await.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Signal listener stopped");
    }))
}

/// Non-Unix implementation: Ctrl+C only.
///
/// # Errors
///
/// Never fails; the signature matches the Unix version.
#[cfg(not(unix))]
pub fn spawn_signal_listener(handle: SchedulerHandle) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received Ctrl+C, stopping");
            let _ = handle.stop().await;
        }
        debug!("Signal listener stopped");
    }))
}
