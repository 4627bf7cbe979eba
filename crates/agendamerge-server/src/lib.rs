//! Merge engine: orchestration, publishing, scheduling.
//!
//! - [`MergeEngine`] - merges output feeds from their sources
//! - [`FeedWriter`] - renders and atomically publishes merged feeds
//! - [`Scheduler`] - reruns the batch periodically or on demand
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agendamerge_core::OutputFeedSpec;
//! use agendamerge_providers::HttpFetcher;
//! use agendamerge_server::{FeedWriter, MergeEngine};
//!
//! # async fn run(specs: Vec<OutputFeedSpec>) -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MergeEngine::new(Arc::new(HttpFetcher::new()?), FeedWriter::new("public"));
//! let batch = engine.run_all(&specs).await;
//! for (feed, error) in batch.failures() {
//!     eprintln!("{feed}: {error}");
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod merge;
mod scheduler;
mod signals;
mod writer;

pub use error::{MergeError, MergeResult};
pub use merge::{BatchReport, FeedReport, FeedRun, MergeEngine, MergeStage, SourceReport};
pub use scheduler::{
    Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState,
    SharedSchedulerState,
};
pub use signals::spawn_signal_listener;
pub use writer::{FeedWriter, PRODID, SOURCE_PROPERTY, WriteOutcome, render};
