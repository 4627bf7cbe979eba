//! Run-level error types.
//!
//! Per-source and per-entry problems never reach this level; they are
//! logged and the run continues. Only the two outcomes below fail a feed.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for merge runs.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that fail a whole feed run.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Every source of the feed failed to fetch or parse.
    #[error("no sources available for feed {feed} ({attempted} attempted)")]
    NoSourcesAvailable { feed: String, attempted: usize },

    /// The output file could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MergeError {
    /// Creates a no sources available error.
    pub fn no_sources(feed: impl Into<String>, attempted: usize) -> Self {
        Self::NoSourcesAvailable {
            feed: feed.into(),
            attempted,
        }
    }

    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}
