//! Visibility filtering and option-tag handling.
//!
//! [`apply_visibility`] is total: every [`Visibility`] value is handled and
//! no input entry can make it fail. Unknown visibility names are rejected
//! while the configuration is validated, long before any entry exists.

use crate::entry::CalendarEntry;
use crate::feed::Visibility;

/// Title used for every entry of a [`Visibility::BusyOnly`] feed.
pub const BUSY_MARKER: &str = "Bezet";

/// Title tag marking an entry as a tentative option booking.
pub const OPTION_MARKER: &str = "[optie]";

/// Applies a visibility level to a single entry.
///
/// - [`Visibility::AllDetails`] keeps every field and prefixes the title
///   with the source label.
/// - [`Visibility::TitleOnly`] keeps only the identifier, the times and the
///   prefixed title.
/// - [`Visibility::BusyOnly`] keeps only the identifier and the times, under
///   [`BUSY_MARKER`].
pub fn apply_visibility(entry: CalendarEntry, visibility: Visibility) -> CalendarEntry {
    match visibility {
        Visibility::AllDetails => {
            let title = prefixed_title(&entry);
            CalendarEntry { title, ..entry }
        }
        Visibility::TitleOnly => {
            let title = prefixed_title(&entry);
            CalendarEntry {
                end: entry.end,
                ..CalendarEntry::new(entry.uid, entry.start, title)
            }
        }
        Visibility::BusyOnly => CalendarEntry {
            end: entry.end,
            ..CalendarEntry::new(entry.uid, entry.start, BUSY_MARKER)
        },
    }
}

/// Builds `"<decoration> <source>: <title>"`.
///
/// Entries without a title get just the source prefix; entries without a
/// source keep their title unchanged.
fn prefixed_title(entry: &CalendarEntry) -> String {
    let Some(ref source) = entry.source else {
        return entry.title.clone();
    };

    let prefix = source.prefix();
    let title = entry.title.trim();
    if title.is_empty() {
        prefix
    } else {
        format!("{}: {}", prefix, title)
    }
}

/// Returns true if the entry title carries the option tag.
pub fn is_option(entry: &CalendarEntry) -> bool {
    entry.title.to_lowercase().contains(OPTION_MARKER)
}

/// Removes option-tagged entries unless `include_options` is set.
///
/// Returns the kept entries and the number removed.
pub fn filter_options(
    entries: Vec<CalendarEntry>,
    include_options: bool,
) -> (Vec<CalendarEntry>, usize) {
    if include_options {
        return (entries, 0);
    }

    let before = entries.len();
    let kept: Vec<_> = entries.into_iter().filter(|e| !is_option(e)).collect();
    let removed = before - kept.len();
    (kept, removed)
}
