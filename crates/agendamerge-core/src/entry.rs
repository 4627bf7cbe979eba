//! Calendar entry types.
//!
//! [`CalendarEntry`] is the uniform, source-independent representation every
//! source feed is normalized into. Entries are assembled with builder
//! methods while a merge run is in progress and are treated as immutable
//! values once they are part of a [`MergedFeed`](crate::MergedFeed).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::time::{EntryTime, TimeKey};

/// Identifies the source feed an entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLabel {
    /// Display name of the source (e.g. "Welpen").
    pub display_name: String,
    /// Optional short decoration shown in front of the name (e.g. an emoji).
    pub decoration: Option<String>,
}

impl SourceLabel {
    /// Creates a label without decoration.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            decoration: None,
        }
    }

    /// Builder method to set the decoration.
    pub fn with_decoration(mut self, decoration: impl Into<String>) -> Self {
        self.decoration = Some(decoration.into());
        self
    }

    /// Returns `"<decoration> <display name>"`, or just the display name when
    /// there is no decoration.
    pub fn prefix(&self) -> String {
        match self.decoration.as_deref().map(str::trim) {
            Some(decoration) if !decoration.is_empty() => {
                format!("{} {}", decoration, self.display_name)
            }
            _ => self.display_name.clone(),
        }
    }
}

/// A source property the merge engine does not interpret.
///
/// Kept with its parameters and in source order so that repeated
/// properties such as `EXDATE` or `ATTENDEE` are written back as read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueProperty {
    /// Upper-case property name.
    pub name: String,
    /// Parameters as `(name, value)` pairs, e.g. `("TZID", "Europe/Amsterdam")`.
    #[serde(default)]
    pub params: Vec<(String, String)>,
    pub value: String,
}

impl OpaqueProperty {
    /// Creates a property without parameters.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    /// Builder method to add a parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Returns the value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The fields a [`CalendarEntry`] can carry.
///
/// Used to reason about what a visibility level keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryField {
    Uid,
    Start,
    End,
    Title,
    Description,
    Location,
    OtherFields,
    Source,
}

/// A single calendar occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
    /// Unique identifier, taken verbatim from the source feed.
    pub uid: String,

    /// When the entry starts.
    pub start: EntryTime,

    /// When the entry ends. Absent means a zero-duration occurrence.
    pub end: Option<EntryTime>,

    /// The entry title. Empty when the source had none.
    pub title: String,

    /// Free-form description.
    pub description: Option<String>,

    /// Location text.
    pub location: Option<String>,

    /// Any other properties of the source entry, in source order.
    #[serde(default)]
    pub other_fields: Vec<OpaqueProperty>,

    /// The source this entry was read from. Unset straight out of the
    /// normalizer; attached by the orchestrator.
    pub source: Option<SourceLabel>,
}

impl CalendarEntry {
    /// Creates an entry with the required fields.
    pub fn new(uid: impl Into<String>, start: EntryTime, title: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            start,
            end: None,
            title: title.into(),
            description: None,
            location: None,
            other_fields: Vec::new(),
            source: None,
        }
    }

    /// Builder method to set the end time.
    pub fn with_end(mut self, end: EntryTime) -> Self {
        self.end = Some(end);
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Builder method to add an opaque property without parameters.
    pub fn with_field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_property(OpaqueProperty::new(name, value))
    }

    /// Builder method to add an opaque property.
    pub fn with_property(mut self, property: OpaqueProperty) -> Self {
        self.other_fields.push(property);
        self
    }

    /// Returns the value of the first opaque property with this name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields(name).next().map(|p| p.value.as_str())
    }

    /// Returns every opaque property with this name, in source order.
    pub fn fields<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a OpaqueProperty> + use<'a, 'n> {
        self.other_fields
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
    }

    /// Builder method to attach the source label.
    pub fn with_source(mut self, source: SourceLabel) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the end time, falling back to the start for zero-duration entries.
    pub fn effective_end(&self) -> &EntryTime {
        self.end.as_ref().unwrap_or(&self.start)
    }

    /// Returns the title/time key under which entries from different
    /// sources are considered the same occurrence.
    pub fn duplicate_key(&self) -> DuplicateKey {
        DuplicateKey {
            title: normalize_title(&self.title),
            start: self.start.key(),
            end: self.effective_end().key(),
        }
    }

    /// Returns the set of fields this entry carries.
    pub fn present_fields(&self) -> BTreeSet<EntryField> {
        let mut fields = BTreeSet::from([EntryField::Uid, EntryField::Start]);
        if self.end.is_some() {
            fields.insert(EntryField::End);
        }
        if !self.title.is_empty() {
            fields.insert(EntryField::Title);
        }
        if self.description.is_some() {
            fields.insert(EntryField::Description);
        }
        if self.location.is_some() {
            fields.insert(EntryField::Location);
        }
        if !self.other_fields.is_empty() {
            fields.insert(EntryField::OtherFields);
        }
        if self.source.is_some() {
            fields.insert(EntryField::Source);
        }
        fields
    }
}

/// Title and time key of an entry, see [`CalendarEntry::duplicate_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DuplicateKey {
    pub title: String,
    pub start: TimeKey,
    pub end: TimeKey,
}

/// Trims a title and collapses runs of whitespace into single spaces.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}
