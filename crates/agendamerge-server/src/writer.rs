//! Feed Writer: serializes a merged feed and publishes it atomically.
//!
//! The rendered calendar is written to a temporary file inside the output
//! directory and renamed over the previous file, so readers see either the
//! old feed or the new one. A failed write leaves the old file in place and
//! the temporary file is removed when it is dropped.
//!
//! Rendering is deterministic: the same entries always produce the same
//! bytes, which lets an unchanged feed skip the rename entirely.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use agendamerge_core::{CalendarEntry, EntryTime, MergedFeed, OpaqueProperty, OutputFeedSpec};
use icalendar::{Calendar, Component, Event, EventLike, Property, ValueType};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{MergeError, MergeResult};

/// Product identifier written into every output feed.
pub const PRODID: &str = "-//agendamerge//agendamerge//EN";

/// Property carrying the source label of an entry.
pub const SOURCE_PROPERTY: &str = "X-SOURCE-CALENDAR";

/// Text properties whose unescaped commas separate list items.
const TEXT_LIST_PROPERTIES: &[&str] = &["CATEGORIES", "RESOURCES"];

/// What a write did to the published file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The file was created or replaced.
    Written,
    /// The file already had exactly this content and was left alone.
    Unchanged,
}

impl WriteOutcome {
    /// Returns a short name for reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Writes merged feeds into an output directory.
#[derive(Debug, Clone)]
pub struct FeedWriter {
    output_dir: PathBuf,
}

impl FeedWriter {
    /// Creates a writer for the given output directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Returns the output directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Returns where the feed is published.
    pub fn output_path(&self, spec: &OutputFeedSpec) -> PathBuf {
        self.output_dir.join(&spec.output_file)
    }

    /// Renders and publishes a merged feed.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::Write`] on any filesystem failure. The
    /// previously published file is untouched in that case.
    pub fn write(&self, feed: &MergedFeed) -> MergeResult<WriteOutcome> {
        let path = self.output_path(&feed.spec);
        let rendered = render(feed);

        if let Ok(existing) = fs::read(&path)
            && existing == rendered.as_bytes()
        {
            debug!(path = %path.display(), "Output unchanged");
            return Ok(WriteOutcome::Unchanged);
        }

        self.persist(&path, rendered.as_bytes())
            .map_err(|e| MergeError::write(&path, e))?;

        debug!(path = %path.display(), bytes = rendered.len(), "Output written");
        Ok(WriteOutcome::Written)
    }

    fn persist(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        fs::create_dir_all(&self.output_dir)?;

        let mut tmp = NamedTempFile::new_in(&self.output_dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;

        // Temporary files are created owner-only; published feeds are read by
        // whatever serves the output directory.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(fs::Permissions::from_mode(0o644))?;
        }

        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Renders a merged feed as ICS text.
pub fn render(feed: &MergedFeed) -> String {
    let spec = &feed.spec;

    let mut calendar = Calendar::new();
    calendar.name(spec.calendar_name());
    if let Some(ref description) = spec.metadata.description {
        calendar.description(description);
    }
    if let Some(ref timezone) = spec.metadata.timezone {
        calendar.timezone(timezone);
    }

    for entry in &feed.entries {
        calendar.push(render_entry(entry));
    }

    finish(&calendar.done().to_string())
}

fn render_entry(entry: &CalendarEntry) -> Event {
    let mut event = Event::new();
    event.uid(&entry.uid);
    event.add_property("DTSTAMP", dtstamp(entry));
    add_time_property(&mut event, "DTSTART", &entry.start);
    if let Some(ref end) = entry.end {
        add_time_property(&mut event, "DTEND", end);
    }
    event.summary(&entry.title);

    if let Some(ref description) = entry.description {
        event.description(description);
    }
    if let Some(ref location) = entry.location {
        event.location(location);
    }

    // Repeated properties (EXDATE, ATTENDEE, ...) keep their source order.
    for property in entry.other_fields.iter().filter(|p| p.name != "DTSTAMP") {
        for prop in opaque_properties(property) {
            event.append_multi_property(prop);
        }
    }

    if let Some(ref source) = entry.source {
        event.add_property(SOURCE_PROPERTY, source.prefix());
    }

    event.done()
}

/// The source's own DTSTAMP when it survived filtering, otherwise the entry
/// start. Never the current time.
fn dtstamp(entry: &CalendarEntry) -> String {
    entry
        .field("DTSTAMP")
        .map(str::to_string)
        .unwrap_or_else(|| {
            entry
                .start
                .to_utc_lossy()
                .format("%Y%m%dT%H%M%SZ")
                .to_string()
        })
}

/// Rebuilds a source property. List-valued text properties become one
/// property per item, since the library escapes every comma in text values.
fn opaque_properties(opaque: &OpaqueProperty) -> Vec<Property> {
    let values: Vec<&str> = if TEXT_LIST_PROPERTIES.contains(&opaque.name.as_str()) {
        opaque.value.split(',').filter(|v| !v.is_empty()).collect()
    } else {
        vec![opaque.value.as_str()]
    };

    values
        .into_iter()
        .map(|value| {
            let mut prop = Property::new(&opaque.name, value);
            for (name, param) in &opaque.params {
                prop.add_parameter(name, &param_value(param));
            }
            prop.done()
        })
        .collect()
}

/// Quotes parameter values containing a comma. The library itself only
/// quotes values with `:` or `;`.
fn param_value(value: &str) -> String {
    if value.contains(',') && !value.contains([':', ';']) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

fn add_time_property(event: &mut Event, name: &str, time: &EntryTime) {
    match time {
        EntryTime::Date(date) => {
            let mut prop = Property::new(name, date.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            event.append_property(prop);
        }
        EntryTime::Utc(dt) => {
            event.add_property(name, dt.format("%Y%m%dT%H%M%SZ").to_string());
        }
        EntryTime::Floating(naive) => {
            event.add_property(name, naive.format("%Y%m%dT%H%M%S").to_string());
        }
        EntryTime::Zoned { date_time, tzid } => {
            let mut prop = Property::new(name, date_time.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            event.append_property(prop);
        }
    }
}

/// Replaces the library's PRODID with ours and marks the feed as published.
fn finish(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len() + 64);

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:");
            result.push_str(PRODID);
            result.push_str("\r\nMETHOD:PUBLISH\r\n");
            continue;
        }
        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
