//! Periodic merge scheduler.
//!
//! Runs the batch once at start and then every interval, with jitter so
//! several deployments polling the same providers do not line up. A
//! [`SchedulerHandle`] is the "run merge now" trigger for whatever serves the
//! output directory. A failed run is not retried; the next tick runs again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Base interval between runs.
    pub interval: Duration,
    /// Maximum jitter added to or removed from the interval (fraction 0.0-1.0).
    pub jitter_fraction: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            jitter_fraction: 0.1,
        }
    }
}

impl SchedulerConfig {
    /// Creates a config with the given interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Calculates the next delay with jitter, saturating at [`Duration::MAX`].
    pub fn next_delay(&self) -> Duration {
        let base = self.interval.as_secs_f64();
        let jitter = rand_jitter(base * self.jitter_fraction);
        Duration::try_from_secs_f64((base + jitter).max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Pseudo-random value in [-range, range] taken from the clock's nanoseconds.
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();

    let fraction = (nanos as f64) / 1_000_000_000.0;
    (fraction * 2.0 - 1.0) * range
}

/// Commands accepted by a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run the batch immediately.
    SyncNow,
    /// Stop the scheduler.
    Stop,
}

/// Outcome history of scheduled runs.
#[derive(Debug, Clone, Default)]
pub struct SchedulerState {
    /// Number of runs performed.
    pub runs: u64,
    /// Runs failed in a row.
    pub consecutive_failures: u32,
    /// When the last fully successful run finished.
    pub last_success: Option<DateTime<Utc>>,
    /// When the last run finished.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Error summary of the last failed run.
    pub last_error: Option<String>,
}

impl SchedulerState {
    /// Records a successful run.
    pub fn record_success(&mut self) {
        self.runs += 1;
        self.consecutive_failures = 0;
        self.last_success = Some(Utc::now());
        self.last_attempt = self.last_success;
        self.last_error = None;
    }

    /// Records a failed run.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.runs += 1;
        self.consecutive_failures += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}

/// Shared scheduler state.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

/// Runs a merge batch on a schedule.
pub struct Scheduler {
    config: SchedulerConfig,
    state: SharedSchedulerState,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl Scheduler {
    /// Creates a scheduler with the given configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> SharedSchedulerState {
        self.state.clone()
    }

    /// Runs until stopped.
    ///
    /// `run_batch` performs one full merge and returns `Err` with a summary
    /// when any feed failed.
    pub async fn run<F, Fut>(self, run_batch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), String>> + Send,
    {
        let Self {
            config,
            state,
            command_tx,
            mut command_rx,
        } = self;
        // Only handles keep the channel open from here on.
        drop(command_tx);

        info!(interval_secs = config.interval.as_secs(), "Scheduler started");

        run_once(&state, &run_batch).await;

        loop {
            let delay = config.next_delay();
            debug!(delay_secs = delay.as_secs(), "Scheduling next run");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    run_once(&state, &run_batch).await;
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::SyncNow) => {
                            debug!("Received SyncNow command");
                            run_once(&state, &run_batch).await;
                        }
                        Some(SchedulerCommand::Stop) | None => {
                            info!("Scheduler stopping");
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn run_once<F, Fut>(state: &SharedSchedulerState, run_batch: &F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    debug!("Starting scheduled run");
    match run_batch().await {
        Ok(()) => {
            info!("Scheduled run completed");
            state.write().await.record_success();
        }
        Err(e) => {
            warn!(error = %e, "Scheduled run had failures");
            state.write().await.record_failure(e);
        }
    }
}

/// Handle for sending commands to a running scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    state: SharedSchedulerState,
}

impl SchedulerHandle {
    /// Triggers an immediate run.
    pub async fn sync_now(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::SyncNow).await
    }

    /// Stops the scheduler.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<SchedulerCommand>> {
        self.command_tx.send(SchedulerCommand::Stop).await
    }

    /// Returns a snapshot of the scheduler state.
    pub async fn state(&self) -> SchedulerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn config_default() {
        let config = SchedulerConfig::default();
        assert_eq!(config.interval, Duration::from_secs(900));
        assert!(config.jitter_fraction > 0.0);
    }

    #[test]
    fn next_delay_within_jitter() {
        let config = SchedulerConfig::new(Duration::from_secs(60));

        let delay = config.next_delay();
        assert!(delay.as_secs_f64() >= 54.0);
        assert!(delay.as_secs_f64() <= 66.0);
    }

    #[test]
    fn huge_interval_saturates() {
        let config = SchedulerConfig {
            interval: Duration::from_secs(u64::MAX),
            jitter_fraction: 0.0,
        };
        assert_eq!(config.next_delay(), Duration::MAX);
    }

    #[test]
    fn state_records_outcomes() {
        let mut state = SchedulerState::default();

        state.record_failure("welpen: no sources available");
        state.record_failure("welpen: no sources available");
        assert_eq!(state.consecutive_failures, 2);
        assert!(state.last_success.is_none());
        assert!(state.last_attempt.is_some());

        state.record_success();
        assert_eq!(state.runs, 3);
        assert_eq!(state.consecutive_failures, 0);
        assert!(state.last_success.is_some());
        assert!(state.last_error.is_none());
    }

    #[tokio::test]
    async fn scheduler_runs_on_start_and_on_demand() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();

        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();

        let task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let runs = runs_clone.clone();
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runs.load(Ordering::SeqCst) >= 1);

        handle.sync_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runs.load(Ordering::SeqCst) >= 2);
        assert!(handle.state().await.last_success.is_some());

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_recorded_not_retried() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();

        let runs = Arc::new(AtomicU32::new(0));
        let runs_clone = runs.clone();

        let task = tokio::spawn(async move {
            scheduler
                .run(move || {
                    let runs = runs_clone.clone();
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        Err("welpen: no sources available".to_string())
                    }
                })
                .await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let state = handle.state().await;
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(
            state.last_error.as_deref(),
            Some("welpen: no sources available")
        );

        handle.stop().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_all_handles_stops_the_scheduler() {
        let scheduler = Scheduler::new(SchedulerConfig::new(Duration::from_secs(60)));
        let handle = scheduler.handle();

        let task = tokio::spawn(scheduler.run(|| async { Ok(()) }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(handle);

        task.await.unwrap();
    }
}
