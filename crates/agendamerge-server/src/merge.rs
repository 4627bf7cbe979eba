//! Merge Orchestrator.
//!
//! One run of [`MergeEngine::run_feed`] takes an output feed through
//!
//! ```text
//! Fetching ─▶ Normalizing ─▶ Deduplicating ─▶ Filtering ─▶ Writing ─▶ Written
//!     │            │                                          │
//!     └────────────┴──────────── no source left ──────────────┴──▶ Failed
//! ```
//!
//! and keeps no state between runs beyond the published file. Source
//! fetches run concurrently, each under its own timeout; a failed source is
//! logged and skipped. Results are assembled in configured source order, so
//! the output never depends on which fetch finished first.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use agendamerge_core::{
    CalendarEntry, MergedFeed, OutputFeedSpec, SourceLabel, SourceSpec, apply_visibility,
    deduplicate, filter_options,
};
use agendamerge_providers::{SourceError, SourceFetcher, SourceResult, normalize_feed};
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::error::{MergeError, MergeResult};
use crate::writer::{FeedWriter, WriteOutcome};

/// Stage of a feed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStage {
    Fetching,
    Normalizing,
    Deduplicating,
    Filtering,
    Writing,
    /// The feed was published, possibly with some sources skipped.
    Written,
    /// No source succeeded or the write failed. The old file is untouched.
    Failed,
}

impl MergeStage {
    /// Returns true for `Written` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Written | Self::Failed)
    }

    /// Returns a short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Normalizing => "normalizing",
            Self::Deduplicating => "deduplicating",
            Self::Filtering => "filtering",
            Self::Writing => "writing",
            Self::Written => "written",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one source fared in a run.
#[derive(Debug, Clone)]
pub struct SourceReport {
    /// Display name of the source.
    pub name: String,
    /// Entries contributed before deduplication.
    pub entries: usize,
    /// Entries dropped by the normalizer.
    pub rejected: usize,
    /// Why the source was skipped, if it was.
    pub error: Option<String>,
}

impl SourceReport {
    /// Returns true if the source contributed to the feed.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a successful feed run.
#[derive(Debug, Clone)]
pub struct FeedReport {
    /// Feed name.
    pub feed: String,
    /// Published file.
    pub output_path: PathBuf,
    /// Whether the file was replaced.
    pub outcome: WriteOutcome,
    /// Entries in the published feed.
    pub entries: usize,
    /// Per-source results in configured order.
    pub sources: Vec<SourceReport>,
    /// Entries removed as duplicates.
    pub duplicates_removed: usize,
    /// Option-tagged entries removed.
    pub options_removed: usize,
    /// When the merged feed was produced.
    pub generated_at: DateTime<Utc>,
}

impl FeedReport {
    /// Returns the sources that were skipped.
    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.is_ok())
    }
}

/// Result of one feed in a batch.
#[derive(Debug)]
pub struct FeedRun {
    /// Feed name.
    pub feed: String,
    /// What happened.
    pub result: MergeResult<FeedReport>,
}

/// Results of a batch, in configured feed order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub runs: Vec<FeedRun>,
}

impl BatchReport {
    /// Returns true if every feed was published.
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(|run| run.result.is_ok())
    }

    /// Returns the feeds that failed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &MergeError)> {
        self.runs.iter().filter_map(|run| match run.result {
            Ok(_) => None,
            Err(ref e) => Some((run.feed.as_str(), e)),
        })
    }
}

/// Runs merges for output feeds.
#[derive(Clone)]
pub struct MergeEngine {
    fetcher: Arc<dyn SourceFetcher>,
    writer: FeedWriter,
}

impl fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeEngine")
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl MergeEngine {
    /// Creates an engine fetching through `fetcher` and publishing through
    /// `writer`.
    pub fn new(fetcher: Arc<dyn SourceFetcher>, writer: FeedWriter) -> Self {
        Self { fetcher, writer }
    }

    /// Returns the writer.
    pub fn writer(&self) -> &FeedWriter {
        &self.writer
    }

    /// Merges every feed concurrently.
    pub async fn run_all(&self, specs: &[OutputFeedSpec]) -> BatchReport {
        let runs = join_all(specs.iter().map(|spec| async move {
            FeedRun {
                feed: spec.name.clone(),
                result: self.run_feed(spec).await,
            }
        }))
        .await;

        BatchReport { runs }
    }

    /// Merges one feed and publishes it.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::NoSourcesAvailable`] when every source failed
    /// and [`MergeError::Write`] when publishing failed. The previously
    /// published file is left as it was in both cases.
    pub async fn run_feed(&self, spec: &OutputFeedSpec) -> MergeResult<FeedReport> {
        let mut run = FeedMerge::new(spec);
        let result = self.drive(&mut run).await;

        match result {
            Ok(ref report) => {
                run.advance(MergeStage::Written);
                info!(
                    feed = %spec.name,
                    entries = report.entries,
                    skipped_sources = report.failed_sources().count(),
                    outcome = report.outcome.as_str(),
                    "Feed merged"
                );
            }
            Err(ref e) => {
                run.advance(MergeStage::Failed);
                error!(feed = %spec.name, error = %e, "Feed merge failed");
            }
        }

        result
    }

    async fn drive(&self, run: &mut FeedMerge<'_>) -> MergeResult<FeedReport> {
        let spec = run.spec;

        let fetched = join_all(
            spec.sources
                .iter()
                .map(|source| self.fetch_source(spec, source)),
        )
        .await;

        run.advance(MergeStage::Normalizing);
        let (entries, sources) = collect_entries(spec, fetched);
        if !sources.iter().any(SourceReport::is_ok) {
            return Err(MergeError::no_sources(&spec.name, spec.sources.len()));
        }

        let (entries, options_removed) = filter_options(entries, spec.include_options);

        run.advance(MergeStage::Deduplicating);
        let outcome = deduplicate(entries);
        let duplicates_removed = outcome.dropped();

        run.advance(MergeStage::Filtering);
        let entries: Vec<CalendarEntry> = outcome
            .entries
            .into_iter()
            .map(|entry| apply_visibility(entry, spec.visibility))
            .collect();

        run.advance(MergeStage::Writing);
        let merged = MergedFeed::new(spec.clone(), entries);
        let generated_at = merged.generated_at;
        let entry_count = merged.len();
        let output_path = self.writer.output_path(spec);

        let writer = self.writer.clone();
        let outcome = tokio::task::spawn_blocking(move || writer.write(&merged))
            .await
            .map_err(|e| MergeError::write(&output_path, io::Error::other(e)))??;

        Ok(FeedReport {
            feed: spec.name.clone(),
            output_path,
            outcome,
            entries: entry_count,
            sources,
            duplicates_removed,
            options_removed,
            generated_at,
        })
    }

    async fn fetch_source(
        &self,
        spec: &OutputFeedSpec,
        source: &SourceSpec,
    ) -> SourceResult<Vec<u8>> {
        match tokio::time::timeout(spec.fetch_timeout, self.fetcher.fetch(source)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::timeout(format!(
                "no response within {:?}",
                spec.fetch_timeout
            ))
            .with_source_name(&source.display_name)),
        }
    }
}

/// Stage tracking for one feed run.
struct FeedMerge<'a> {
    spec: &'a OutputFeedSpec,
    stage: MergeStage,
}

impl<'a> FeedMerge<'a> {
    fn new(spec: &'a OutputFeedSpec) -> Self {
        debug!(feed = %spec.name, sources = spec.sources.len(), "Starting merge");
        Self {
            spec,
            stage: MergeStage::Fetching,
        }
    }

    fn advance(&mut self, next: MergeStage) {
        debug_assert!(!self.stage.is_terminal());
        debug!(feed = %self.spec.name, from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
    }
}

/// Normalizes fetched sources and labels their entries, in source order.
fn collect_entries(
    spec: &OutputFeedSpec,
    fetched: Vec<SourceResult<Vec<u8>>>,
) -> (Vec<CalendarEntry>, Vec<SourceReport>) {
    let mut entries = Vec::new();
    let mut reports = Vec::with_capacity(spec.sources.len());

    for (source, result) in spec.sources.iter().zip(fetched) {
        let name = source.display_name.clone();

        match result.and_then(|bytes| normalize_feed(&bytes)) {
            Ok(normalized) => {
                for rejected in &normalized.rejected {
                    warn!(feed = %spec.name, source = %name, error = %rejected, "Dropping entry");
                }

                let label = source_label(source);
                let count = normalized.entries.len();
                entries.extend(
                    normalized
                        .entries
                        .into_iter()
                        .map(|entry| entry.with_source(label.clone())),
                );

                debug!(feed = %spec.name, source = %name, entries = count, "Source normalized");
                reports.push(SourceReport {
                    name,
                    entries: count,
                    rejected: normalized.rejected.len(),
                    error: None,
                });
            }
            Err(e) => {
                warn!(feed = %spec.name, source = %name, error = %e, "Skipping source");
                reports.push(SourceReport {
                    name,
                    entries: 0,
                    rejected: 0,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    (entries, reports)
}

fn source_label(source: &SourceSpec) -> SourceLabel {
    let label = SourceLabel::new(&source.display_name);
    match source.decoration {
        Some(ref decoration) => label.with_decoration(decoration),
        None => label,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agendamerge_core::Visibility;
    use agendamerge_providers::BoxFuture;
    use std::collections::HashMap;
    use std::fs;
    use std::time::Duration;
    use url::Url;

    enum Canned {
        Body(String),
        Delayed(String, Duration),
        Fail,
        Hang,
    }

    /// Serves canned responses keyed by source display name.
    #[derive(Default)]
    struct CannedFetcher {
        responses: HashMap<String, Canned>,
    }

    impl CannedFetcher {
        fn with(mut self, name: &str, canned: Canned) -> Self {
            self.responses.insert(name.to_string(), canned);
            self
        }
    }

    impl SourceFetcher for CannedFetcher {
        fn fetch<'a>(&'a self, source: &'a SourceSpec) -> BoxFuture<'a, SourceResult<Vec<u8>>> {
            Box::pin(async move {
                match self.responses.get(&source.display_name) {
                    Some(Canned::Body(body)) => Ok(body.clone().into_bytes()),
                    Some(Canned::Delayed(body, delay)) => {
                        tokio::time::sleep(*delay).await;
                        Ok(body.clone().into_bytes())
                    }
                    Some(Canned::Hang) => {
                        std::future::pending::<()>().await;
                        unreachable!()
                    }
                    Some(Canned::Fail) | None => Err(SourceError::fetch("connection refused")
                        .with_source_name(&source.display_name)),
                }
            })
        }
    }

    fn event(uid: &str, title: &str, start: &str, extra: &str) -> String {
        format!(
            "BEGIN:VEVENT\r\nUID:{}\r\nDTSTAMP:20250501T000000Z\r\nDTSTART:{}\r\nSUMMARY:{}\r\n{}END:VEVENT\r\n",
            uid, start, title, extra
        )
    }

    fn calendar(events: &[String]) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{}END:VCALENDAR\r\n",
            events.concat()
        )
    }

    fn source(name: &str) -> SourceSpec {
        SourceSpec::new(
            Url::parse(&format!("https://calendar.example.org/{}.ics", name)).unwrap(),
            name,
        )
    }

    fn engine(fetcher: CannedFetcher, dir: &std::path::Path) -> MergeEngine {
        MergeEngine::new(Arc::new(fetcher), FeedWriter::new(dir))
    }

    fn published(engine: &MergeEngine, spec: &OutputFeedSpec) -> String {
        fs::read_to_string(engine.writer().output_path(spec)).unwrap()
    }

    fn uids_in(ics: &str) -> Vec<String> {
        ics.lines()
            .filter_map(|l| l.strip_prefix("UID:"))
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn weekendkamp_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default()
            .with(
                "Welpen",
                Canned::Body(calendar(&[event(
                    "x1",
                    "Weekendkamp",
                    "20250601T100000Z",
                    "DESCRIPTION:Slaapzak mee\r\nLOCATION:Clubhuis\r\n",
                )])),
            )
            .with(
                "Groep",
                Canned::Body(calendar(&[event(
                    "x2",
                    "Weekendkamp",
                    "20250601T100000Z",
                    "LOCATION:Kampterrein\r\n",
                )])),
            );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("leiding", Visibility::TitleOnly)
            .with_source(source("Welpen"))
            .with_source(source("Groep"));

        let report = engine.run_feed(&spec).await.unwrap();
        assert_eq!(report.entries, 1);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.outcome, WriteOutcome::Written);

        let ics = published(&engine, &spec);
        assert_eq!(uids_in(&ics), vec!["x1"]);
        assert!(ics.contains("SUMMARY:Welpen: Weekendkamp"));
        assert!(!ics.contains("DESCRIPTION:Slaapzak"));
        assert!(!ics.contains("LOCATION:"));
        assert!(!ics.contains("X-SOURCE-CALENDAR"));
    }

    #[tokio::test]
    async fn all_details_keeps_fields_and_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default().with(
            "Welpen",
            Canned::Body(calendar(&[event(
                "x1",
                "Opkomst",
                "20250601T100000Z",
                "LOCATION:Clubhuis\r\n",
            )])),
        );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("ouders", Visibility::AllDetails)
            .with_source(source("Welpen").with_decoration("🐺"));

        engine.run_feed(&spec).await.unwrap();
        let ics = published(&engine, &spec);
        assert!(ics.contains("SUMMARY:🐺 Welpen: Opkomst"));
        assert!(ics.contains("LOCATION:Clubhuis"));
        assert!(ics.contains("X-SOURCE-CALENDAR:🐺 Welpen"));
    }

    #[tokio::test]
    async fn busy_only_hides_titles() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default().with(
            "Welpen",
            Canned::Body(calendar(&[event("x1", "Geheim", "20250601T100000Z", "")])),
        );
        let engine = engine(fetcher, dir.path());
        let spec =
            OutputFeedSpec::new("extern", Visibility::BusyOnly).with_source(source("Welpen"));

        engine.run_feed(&spec).await.unwrap();
        let ics = published(&engine, &spec);
        assert!(ics.contains("SUMMARY:Bezet"));
        assert!(!ics.contains("Geheim"));
        assert!(!ics.contains("Welpen"));
    }

    #[tokio::test]
    async fn malformed_source_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default()
            .with(
                "A",
                Canned::Body(calendar(&[
                    event("a1", "Opkomst", "20250601T100000Z", ""),
                    event("shared", "Hike", "20250608T100000Z", ""),
                ])),
            )
            .with(
                "B",
                Canned::Body("<html><body>Session expired</body></html>".to_string()),
            )
            .with(
                "C",
                Canned::Body(calendar(&[
                    event("c1", "Zeilen", "20250615T100000Z", ""),
                    event("shared", "Hike", "20250608T100000Z", ""),
                ])),
            );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("groep", Visibility::TitleOnly)
            .with_source(source("A"))
            .with_source(source("B"))
            .with_source(source("C"));

        let report = engine.run_feed(&spec).await.unwrap();
        assert_eq!(report.failed_sources().count(), 1);
        assert_eq!(report.sources[1].name, "B");
        assert!(!report.sources[1].is_ok());

        let ics = published(&engine, &spec);
        assert_eq!(uids_in(&ics), vec!["a1", "shared", "c1"]);
    }

    #[tokio::test]
    async fn total_failure_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let spec = OutputFeedSpec::new("welpen", Visibility::TitleOnly)
            .with_source(source("A"))
            .with_source(source("B"));

        let good = CannedFetcher::default()
            .with(
                "A",
                Canned::Body(calendar(&[event("a1", "Opkomst", "20250601T100000Z", "")])),
            )
            .with("B", Canned::Fail);
        let first = engine(good, dir.path());
        first.run_feed(&spec).await.unwrap();
        let before = fs::read(first.writer().output_path(&spec)).unwrap();

        let broken = CannedFetcher::default()
            .with("A", Canned::Fail)
            .with("B", Canned::Body("not a calendar".to_string()));
        let second = engine(broken, dir.path());
        let err = second.run_feed(&spec).await.unwrap_err();

        assert!(matches!(
            err,
            MergeError::NoSourcesAvailable { ref feed, attempted: 2 } if feed == "welpen"
        ));
        assert_eq!(fs::read(second.writer().output_path(&spec)).unwrap(), before);
    }

    #[tokio::test]
    async fn total_failure_without_previous_output_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(CannedFetcher::default(), dir.path());
        let spec = OutputFeedSpec::new("welpen", Visibility::TitleOnly).with_source(source("A"));

        assert!(engine.run_feed(&spec).await.is_err());
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn second_run_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default()
            .with(
                "A",
                Canned::Body(calendar(&[event("a1", "Opkomst", "20250601T100000Z", "")])),
            )
            .with(
                "B",
                Canned::Body(calendar(&[event("b1", "Hike", "20250608T100000Z", "")])),
            );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("groep", Visibility::AllDetails)
            .with_source(source("A"))
            .with_source(source("B"));

        let first = engine.run_feed(&spec).await.unwrap();
        let before = fs::read(&first.output_path).unwrap();

        let second = engine.run_feed(&spec).await.unwrap();
        assert_eq!(second.outcome, WriteOutcome::Unchanged);
        assert_eq!(fs::read(&second.output_path).unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn order_follows_sources_not_completion() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default()
            .with(
                "Slow",
                Canned::Delayed(
                    calendar(&[event("slow", "Opkomst", "20250601T100000Z", "")]),
                    Duration::from_secs(5),
                ),
            )
            .with(
                "Fast",
                Canned::Delayed(
                    calendar(&[event("fast", "Opkomst", "20250601T100000Z", "")]),
                    Duration::from_millis(10),
                ),
            );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("groep", Visibility::TitleOnly)
            .with_source(source("Slow"))
            .with_source(source("Fast"));

        engine.run_feed(&spec).await.unwrap();
        let ics = published(&engine, &spec);
        // Same title and time: the first source in configured order wins.
        assert_eq!(uids_in(&ics), vec!["slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_source_times_out_alone() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default()
            .with("Stuck", Canned::Hang)
            .with(
                "Ok",
                Canned::Body(calendar(&[event("ok", "Opkomst", "20250601T100000Z", "")])),
            );
        let engine = engine(fetcher, dir.path());
        let spec = OutputFeedSpec::new("groep", Visibility::TitleOnly)
            .with_source(source("Stuck"))
            .with_source(source("Ok"))
            .with_fetch_timeout(Duration::from_secs(2));

        let report = engine.run_feed(&spec).await.unwrap();
        let stuck = &report.sources[0];
        assert!(stuck.error.as_deref().unwrap().contains("fetch_timeout"));
        assert_eq!(report.entries, 1);
    }

    #[tokio::test]
    async fn options_are_removed_unless_included() {
        let dir = tempfile::tempdir().unwrap();
        let body = calendar(&[
            event("o1", "[Optie] Kamp", "20250601T100000Z", ""),
            event("k1", "Opkomst", "20250608T100000Z", ""),
        ]);
        let fetcher = CannedFetcher::default().with("A", Canned::Body(body));
        let engine = engine(fetcher, dir.path());

        let without = OutputFeedSpec::new("zonder", Visibility::TitleOnly).with_source(source("A"));
        let report = engine.run_feed(&without).await.unwrap();
        assert_eq!(report.options_removed, 1);
        assert_eq!(uids_in(&published(&engine, &without)), vec!["k1"]);

        let with = OutputFeedSpec::new("met", Visibility::TitleOnly)
            .with_source(source("A"))
            .with_include_options(true);
        engine.run_feed(&with).await.unwrap();
        assert_eq!(uids_in(&published(&engine, &with)), vec!["o1", "k1"]);
    }

    #[tokio::test]
    async fn batch_reports_each_feed() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = CannedFetcher::default().with(
            "A",
            Canned::Body(calendar(&[event("a1", "Opkomst", "20250601T100000Z", "")])),
        );
        let engine = engine(fetcher, dir.path());
        let specs = vec![
            OutputFeedSpec::new("goed", Visibility::TitleOnly).with_source(source("A")),
            OutputFeedSpec::new("fout", Visibility::TitleOnly).with_source(source("Missing")),
        ];

        let batch = engine.run_all(&specs).await;
        assert!(!batch.is_success());
        assert_eq!(batch.runs.len(), 2);
        assert_eq!(batch.runs[0].feed, "goed");
        assert!(batch.runs[0].result.is_ok());
        let failures: Vec<_> = batch.failures().map(|(name, _)| name).collect();
        assert_eq!(failures, vec!["fout"]);
    }

    #[test]
    fn terminal_stages() {
        assert!(MergeStage::Written.is_terminal());
        assert!(MergeStage::Failed.is_terminal());
        assert!(!MergeStage::Writing.is_terminal());
        assert_eq!(MergeStage::Deduplicating.to_string(), "deduplicating");
    }
}
