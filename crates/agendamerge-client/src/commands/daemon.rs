//! Daemon command: merge on a schedule in the foreground.
//!
//! - Signal listener (SIGTERM/SIGINT stop, SIGHUP merges now)
//! - Scheduler (periodic batch runs)
//!
//! Whatever serves the output directory only reads the published files.

use std::sync::Arc;

use tracing::info;

use agendamerge_server::{BatchReport, Scheduler, SchedulerConfig, spawn_signal_listener};

use crate::commands::build_engine;
use crate::config::{AppConfig, interval_from_minutes};
use crate::error::ClientResult;

/// Runs the scheduler until a stop signal arrives.
///
/// The configuration is validated once, up front; an invalid configuration
/// never starts the daemon.
pub async fn run(config: &AppConfig, interval_minutes: Option<u64>) -> ClientResult<()> {
    let specs = Arc::new(config.feed_specs()?);
    let interval = match interval_minutes {
        Some(minutes) => interval_from_minutes(minutes, "--interval-minutes")?,
        None => config.interval()?,
    };
    let engine = Arc::new(build_engine(config)?);

    let scheduler = Scheduler::new(SchedulerConfig::new(interval));
    let handle = scheduler.handle();
    let signals = spawn_signal_listener(handle.clone())?;

    info!(
        calendars = specs.len(),
        interval_minutes = interval.as_secs() / 60,
        output_dir = %engine.writer().output_dir().display(),
        pid = std::process::id(),
        "Daemon started"
    );

    scheduler
        .run(move || {
            let engine = engine.clone();
            let specs = specs.clone();
            async move { summarize(&engine.run_all(&specs).await) }
        })
        .await;

    signals.abort();
    let state = handle.state().await;
    info!(
        runs = state.runs,
        consecutive_failures = state.consecutive_failures,
        "Daemon stopped"
    );
    Ok(())
}

/// Collapses a batch into the scheduler's success/failure summary.
fn summarize(batch: &BatchReport) -> Result<(), String> {
    if batch.is_success() {
        return Ok(());
    }
    Err(batch
        .failures()
        .map(|(feed, e)| format!("{}: {}", feed, e))
        .collect::<Vec<_>>()
        .join("; "))
}
