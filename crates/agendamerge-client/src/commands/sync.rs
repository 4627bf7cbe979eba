//! Sync command: merge and publish calendars once.

use tracing::info;

use agendamerge_server::BatchReport;

use crate::commands::{build_engine, select_feeds};
use crate::config::AppConfig;
use crate::error::{ClientError, ClientResult};

/// Merges every configured calendar, or only `feed`, and prints a report.
///
/// # Errors
///
/// Fails before fetching anything if the configuration is invalid, and
/// after the batch if any calendar could not be published.
pub async fn run(config: &AppConfig, feed: Option<&str>) -> ClientResult<()> {
    let specs = select_feeds(config.feed_specs()?, feed)?;
    let engine = build_engine(config)?;

    info!(
        calendars = specs.len(),
        output_dir = %engine.writer().output_dir().display(),
        "Merging calendars"
    );

    let batch = engine.run_all(&specs).await;
    print!("{}", format_report(&batch));
    check(&batch)
}

/// Maps a batch to the command result.
pub(crate) fn check(batch: &BatchReport) -> ClientResult<()> {
    let failed = batch.failures().count();
    if failed == 0 {
        Ok(())
    } else {
        Err(ClientError::FeedsFailed {
            failed,
            total: batch.runs.len(),
        })
    }
}

/// Renders a human readable per-calendar report.
pub fn format_report(batch: &BatchReport) -> String {
    let mut out = String::new();

    for run in &batch.runs {
        let report = match run.result {
            Ok(ref report) => report,
            Err(ref e) => {
                out.push_str(&format!("{}: failed: {}\n", run.feed, e));
                continue;
            }
        };

        out.push_str(&format!(
            "{}: {} entries {} to {}\n",
            report.feed,
            report.entries,
            report.outcome.as_str(),
            report.output_path.display()
        ));
        if report.duplicates_removed > 0 || report.options_removed > 0 {
            out.push_str(&format!(
                "  removed {} duplicates, {} options\n",
                report.duplicates_removed, report.options_removed
            ));
        }
        for source in &report.sources {
            if let Some(ref error) = source.error {
                out.push_str(&format!("  skipped {}: {}\n", source.name, error));
            } else if source.rejected > 0 {
                out.push_str(&format!(
                    "  {}: {} entries rejected\n",
                    source.name, source.rejected
                ));
            }
        }
    }

    out
}
