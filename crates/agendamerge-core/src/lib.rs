//! Core types: entries, feeds, visibility, deduplication, tracing

pub mod dedup;
pub mod entry;
pub mod feed;
pub mod time;
pub mod tracing;
pub mod visibility;

pub use dedup::{DedupOutcome, deduplicate};
pub use entry::{
    CalendarEntry, DuplicateKey, EntryField, OpaqueProperty, SourceLabel, normalize_title,
};
pub use feed::{
    FeedMetadata, MergedFeed, OutputFeedSpec, SourceSpec, UnknownVisibility, Visibility,
    default_output_file,
};
pub use time::{EntryTime, TimeKey, parse_duration};
pub use crate::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use visibility::{BUSY_MARKER, OPTION_MARKER, apply_visibility, filter_options, is_option};
