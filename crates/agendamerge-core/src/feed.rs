//! Source and output feed definitions.
//!
//! These are the strictly typed forms of the configuration: by the time a
//! merge run sees an [`OutputFeedSpec`], every source location has been
//! resolved and parsed and the visibility level is known to be valid.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::entry::CalendarEntry;

/// Redaction policy applied to every entry of an output feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the (source-prefixed) title and the times.
    TitleOnly,
    /// Only the times, under a fixed busy marker.
    BusyOnly,
    /// Everything, with the title prefixed by the source.
    AllDetails,
}

impl Visibility {
    /// Returns the configuration name of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TitleOnly => "title_only",
            Self::BusyOnly => "busy_only",
            Self::AllDetails => "all_details",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a visibility name that is not one of the known levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown visibility level `{0}` (expected title_only, busy_only or all_details)")]
pub struct UnknownVisibility(pub String);

impl FromStr for Visibility {
    type Err = UnknownVisibility;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title_only" => Ok(Self::TitleOnly),
            "busy_only" => Ok(Self::BusyOnly),
            "all_details" => Ok(Self::AllDetails),
            _ => Err(UnknownVisibility(s.to_string())),
        }
    }
}

/// One source feed contributing to an output feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    /// Where to fetch the feed from.
    pub location: Url,
    /// Name shown in front of entry titles.
    pub display_name: String,
    /// Optional short tag shown before the display name.
    pub decoration: Option<String>,
}

impl SourceSpec {
    /// Creates a source without decoration.
    pub fn new(location: Url, display_name: impl Into<String>) -> Self {
        Self {
            location,
            display_name: display_name.into(),
            decoration: None,
        }
    }

    /// Builder method to set the decoration.
    pub fn with_decoration(mut self, decoration: impl Into<String>) -> Self {
        self.decoration = Some(decoration.into());
        self
    }

    /// Returns the location with any query string elided, for logging.
    ///
    /// Calendar share links usually carry their access token in the path or
    /// query, so only scheme, host and the first path segment are shown.
    pub fn redacted_location(&self) -> String {
        let host = self.location.host_str().unwrap_or("");
        let first_segment = self
            .location
            .path_segments()
            .and_then(|mut segments| segments.next())
            .unwrap_or("");
        format!("{}://{}/{}/…", self.location.scheme(), host, first_segment)
    }
}

/// Descriptive properties written into the calendar header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedMetadata {
    /// Calendar name shown by clients. Defaults to the feed name.
    pub cal_name: Option<String>,
    /// Calendar description.
    pub description: Option<String>,
    /// Default timezone hint for clients.
    pub timezone: Option<String>,
}

/// A merged output feed and how to build it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFeedSpec {
    /// Unique feed name.
    pub name: String,
    /// File name inside the output directory.
    pub output_file: String,
    /// Sources in merge order.
    pub sources: Vec<SourceSpec>,
    /// Redaction policy for every entry.
    pub visibility: Visibility,
    /// Timeout applied to each source fetch independently.
    pub fetch_timeout: Duration,
    /// Whether entries tagged as options (`[optie]`) are published.
    pub include_options: bool,
    /// Calendar header properties.
    pub metadata: FeedMetadata,
}

impl OutputFeedSpec {
    /// Default per-source fetch timeout.
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(20);

    /// Creates a feed with no sources and default settings.
    pub fn new(name: impl Into<String>, visibility: Visibility) -> Self {
        let name = name.into();
        Self {
            output_file: default_output_file(&name),
            name,
            sources: Vec::new(),
            visibility,
            fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
            include_options: false,
            metadata: FeedMetadata::default(),
        }
    }

    /// Builder method to append a source.
    pub fn with_source(mut self, source: SourceSpec) -> Self {
        self.sources.push(source);
        self
    }

    /// Builder method to set the output file name.
    pub fn with_output_file(mut self, output_file: impl Into<String>) -> Self {
        self.output_file = output_file.into();
        self
    }

    /// Builder method to set the fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Builder method to publish option-tagged entries.
    pub fn with_include_options(mut self, include: bool) -> Self {
        self.include_options = include;
        self
    }

    /// Builder method to set the header metadata.
    pub fn with_metadata(mut self, metadata: FeedMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the calendar name clients should display.
    pub fn calendar_name(&self) -> &str {
        self.metadata.cal_name.as_deref().unwrap_or(&self.name)
    }
}

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]+").expect("slug regex should be valid"));

/// Derives the default output file name for a feed name.
///
/// `"Groepsbreed Agenda"` becomes `"groepsbreed-agenda.ics"`.
pub fn default_output_file(name: &str) -> String {
    let lowered = name.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "calendar.ics".to_string()
    } else {
        format!("{}.ics", slug)
    }
}

/// The result of one merge run for one output feed.
///
/// Built fresh on every run and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct MergedFeed {
    /// The feed this result belongs to.
    pub spec: OutputFeedSpec,
    /// Deduplicated, filtered entries in publication order.
    pub entries: Vec<CalendarEntry>,
    /// When this result was produced.
    pub generated_at: DateTime<Utc>,
}

impl MergedFeed {
    /// Creates a merged feed stamped with the current time.
    pub fn new(spec: OutputFeedSpec, entries: Vec<CalendarEntry>) -> Self {
        Self {
            spec,
            entries,
            generated_at: Utc::now(),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the feed has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visibility_parses_known_levels() {
        assert_eq!("title_only".parse::<Visibility>(), Ok(Visibility::TitleOnly));
        assert_eq!("BUSY_ONLY".parse::<Visibility>(), Ok(Visibility::BusyOnly));
        assert_eq!(" all_details ".parse::<Visibility>(), Ok(Visibility::AllDetails));
    }

    #[test]
    fn visibility_rejects_unknown_level() {
        let err = "everything".parse::<Visibility>().unwrap_err();
        assert_eq!(err, UnknownVisibility("everything".to_string()));
        assert!(err.to_string().contains("everything"));
    }

    #[test]
    fn visibility_serde_names() {
        let json = serde_json::to_string(&Visibility::TitleOnly).unwrap();
        assert_eq!(json, "\"title_only\"");
        assert_eq!(Visibility::AllDetails.to_string(), "all_details");
    }

    #[test]
    fn default_output_file_slugifies() {
        assert_eq!(default_output_file("welpen"), "welpen.ics");
        assert_eq!(default_output_file("Groepsbreed Agenda"), "groepsbreed-agenda.ics");
        assert_eq!(default_output_file("../etc/passwd"), "etc-passwd.ics");
        assert_eq!(default_output_file("!!!"), "calendar.ics");
    }

    #[test]
    fn feed_spec_builder() {
        let source = SourceSpec::new(
            Url::parse("https://calendar.example.org/ical/welpen/basic.ics").unwrap(),
            "Welpen",
        )
        .with_decoration("🐺");

        let spec = OutputFeedSpec::new("Leiding", Visibility::TitleOnly)
            .with_source(source)
            .with_fetch_timeout(Duration::from_secs(5))
            .with_include_options(true);

        assert_eq!(spec.output_file, "leiding.ics");
        assert_eq!(spec.sources.len(), 1);
        assert_eq!(spec.fetch_timeout, Duration::from_secs(5));
        assert!(spec.include_options);
        assert_eq!(spec.calendar_name(), "Leiding");
    }

    #[test]
    fn redacted_location_hides_tokens() {
        let source = SourceSpec::new(
            Url::parse("https://calendar.example.org/ical/secret-token/basic.ics?key=abc")
                .unwrap(),
            "Welpen",
        );
        let shown = source.redacted_location();
        assert!(shown.starts_with("https://calendar.example.org/ical/"));
        assert!(!shown.contains("secret-token"));
        assert!(!shown.contains("abc"));
    }
}
