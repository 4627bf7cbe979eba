//! Command implementations.

pub mod config;
pub mod daemon;
pub mod list;
pub mod sync;

use std::sync::Arc;

use agendamerge_core::OutputFeedSpec;
use agendamerge_providers::HttpFetcher;
use agendamerge_server::{FeedWriter, MergeEngine};

use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

/// Builds the merge engine publishing into the configured output directory.
pub(crate) fn build_engine(config: &AppConfig) -> ClientResult<MergeEngine> {
    let fetcher = HttpFetcher::new().map_err(|e| ClientError::Setup(e.to_string()))?;
    Ok(MergeEngine::new(
        Arc::new(fetcher),
        FeedWriter::new(config.output_dir()),
    ))
}

/// Keeps only the named feed, or all feeds when no name is given.
pub(crate) fn select_feeds(
    specs: Vec<OutputFeedSpec>,
    feed: Option<&str>,
) -> ClientResult<Vec<OutputFeedSpec>> {
    let Some(name) = feed else {
        return Ok(specs);
    };

    let selected: Vec<_> = specs.into_iter().filter(|s| s.name == name).collect();
    if selected.is_empty() {
        return Err(ClientError::UnknownFeed(name.to_string()));
    }
    Ok(selected)
}
