//! Entry Normalizer: turns the raw bytes of an ICS feed into
//! [`CalendarEntry`] values.
//!
//! A feed that is not calendar data at all fails as a whole with a parse
//! error. Problems with a single `VEVENT` (no `UID`, no usable `DTSTART`)
//! only reject that entry; the rejections are handed back to the caller so
//! they can be logged next to the source and feed they belong to.

use agendamerge_core::{CalendarEntry, EntryTime, OpaqueProperty, parse_duration};
use icalendar::parser::{self, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use tracing::{debug, trace};

use crate::error::{SourceError, SourceResult};

/// Properties mapped to dedicated entry fields. Everything else is carried
/// along in `other_fields`.
const MAPPED_PROPERTIES: &[&str] = &[
    "UID",
    "DTSTART",
    "DTEND",
    "DURATION",
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "X-SOURCE-CALENDAR",
];

/// Entries read from one source feed.
#[derive(Debug, Default)]
pub struct NormalizedFeed {
    /// Entries in feed order, without source label.
    pub entries: Vec<CalendarEntry>,
    /// Entries that could not be normalized and were dropped.
    pub rejected: Vec<SourceError>,
    /// Number of cancelled entries that were skipped.
    pub cancelled: usize,
}

/// Parses a feed into entries.
///
/// # Errors
///
/// Returns a parse error if the bytes are not UTF-8 or not a well-formed
/// `VCALENDAR` object.
pub fn normalize_feed(bytes: &[u8]) -> SourceResult<NormalizedFeed> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| SourceError::parse("feed is not valid UTF-8").with_cause(e))?;
    let text = text.trim_start_matches('\u{feff}');

    if !starts_with_vcalendar(text) {
        return Err(SourceError::parse("feed does not start with BEGIN:VCALENDAR"));
    }

    let unfolded = unfold(text);
    let calendar = read_calendar(&unfolded)
        .map_err(|e| SourceError::parse(format!("malformed calendar data: {}", e)))?;

    let mut feed = NormalizedFeed::default();
    for component in calendar.components.iter().filter(|c| c.name == "VEVENT") {
        match normalize_component(component) {
            Ok(Some(entry)) => feed.entries.push(entry),
            Ok(None) => feed.cancelled += 1,
            Err(e) => feed.rejected.push(e),
        }
    }

    trace!(
        entries = feed.entries.len(),
        rejected = feed.rejected.len(),
        cancelled = feed.cancelled,
        "Normalized feed"
    );

    Ok(feed)
}

fn starts_with_vcalendar(text: &str) -> bool {
    text.trim_start()
        .get(..15)
        .is_some_and(|head| head.eq_ignore_ascii_case("BEGIN:VCALENDAR"))
}

/// Converts one `VEVENT`. Returns `Ok(None)` for cancelled entries.
fn normalize_component(component: &parser::Component<'_>) -> SourceResult<Option<CalendarEntry>> {
    let title = text_value(component, "SUMMARY").unwrap_or_default();

    let uid = text_value(component, "UID").ok_or_else(|| {
        SourceError::missing_identifier(format!("entry {:?} has no UID", title))
    })?;

    let start = match component.find_prop("DTSTART") {
        Some(prop) => time_value(prop).ok_or_else(|| {
            SourceError::invalid_entry(format!(
                "entry {} has an unreadable DTSTART {:?}",
                uid,
                prop.val.as_ref()
            ))
        })?,
        None => {
            return Err(SourceError::invalid_entry(format!(
                "entry {} has no DTSTART",
                uid
            )));
        }
    };

    let end = match component.find_prop("DTEND") {
        Some(prop) => Some(time_value(prop).ok_or_else(|| {
            SourceError::invalid_entry(format!(
                "entry {} has an unreadable DTEND {:?}",
                uid,
                prop.val.as_ref()
            ))
        })?),
        None => match component.find_prop("DURATION") {
            Some(prop) => Some(
                parse_duration(prop.val.as_ref())
                    .and_then(|duration| start.checked_add(duration))
                    .ok_or_else(|| {
                        SourceError::invalid_entry(format!(
                            "entry {} has an unreadable DURATION {:?}",
                            uid,
                            prop.val.as_ref()
                        ))
                    })?,
            ),
            None => None,
        },
    };

    if component
        .find_prop("STATUS")
        .is_some_and(|p| p.val.as_ref().trim().eq_ignore_ascii_case("CANCELLED"))
    {
        debug!(uid = %uid, title = %title, "Skipping cancelled entry");
        return Ok(None);
    }

    let mut entry = CalendarEntry::new(uid, start, title);
    entry.end = end;
    entry.description = text_value(component, "DESCRIPTION");
    entry.location = text_value(component, "LOCATION");

    entry.other_fields = component
        .properties
        .iter()
        .filter_map(opaque_property)
        .collect();

    Ok(Some(entry))
}

/// Copies an unmapped property with its parameters.
fn opaque_property(property: &parser::Property<'_>) -> Option<OpaqueProperty> {
    let name = property.name.as_ref().to_ascii_uppercase();
    if MAPPED_PROPERTIES.contains(&name.as_str()) {
        return None;
    }

    let params = property
        .params
        .iter()
        .map(|param| {
            (
                param.key.as_ref().to_ascii_uppercase(),
                param.val.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            )
        })
        .collect();

    Some(OpaqueProperty {
        name,
        params,
        value: property.val.to_string(),
    })
}

/// Returns the value of a text property, treating blank values as absent.
fn text_value(component: &parser::Component<'_>, name: &str) -> Option<String> {
    component
        .find_prop(name)
        .map(|p| p.val.as_ref().trim().to_string())
        .filter(|value| !value.is_empty())
}

fn time_value(prop: &parser::Property<'_>) -> Option<EntryTime> {
    DatePerhapsTime::try_from(prop).ok().map(entry_time)
}

/// Converts a parsed date or datetime, keeping its timezone form.
fn entry_time(value: DatePerhapsTime) -> EntryTime {
    match value {
        DatePerhapsTime::Date(date) => EntryTime::Date(date),
        DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => EntryTime::Utc(dt),
        DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => EntryTime::Floating(naive),
        DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
            EntryTime::Zoned { date_time, tzid }
        }
    }
}
