//! Cross-source deduplication.
//!
//! Entries are collapsed in two passes over the concatenated source
//! sequences:
//!
//! 1. by unique identifier, first seen wins;
//! 2. among the survivors, by normalized title plus exact start and end,
//!    first seen wins.
//!
//! The surviving sequence keeps first-seen order, which is source order and
//! then the order inside each source. Different providers may assign
//! different identifiers to the same occurrence; pass 2 assumes that two
//! curated sources only share an identical title and time when they describe
//! the same real event.

use std::collections::HashSet;

use tracing::debug;

use crate::entry::CalendarEntry;

/// Result of a deduplication pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    /// Surviving entries in first-seen order.
    pub entries: Vec<CalendarEntry>,
    /// Entries dropped because their identifier was already seen.
    pub dropped_by_uid: usize,
    /// Entries dropped because their title and times were already seen.
    pub dropped_by_key: usize,
}

impl DedupOutcome {
    /// Total number of entries removed.
    pub fn dropped(&self) -> usize {
        self.dropped_by_uid + self.dropped_by_key
    }
}

/// Collapses duplicate candidates to their first-seen representative.
pub fn deduplicate(entries: Vec<CalendarEntry>) -> DedupOutcome {
    let mut seen_uids = HashSet::new();
    let mut by_uid = Vec::with_capacity(entries.len());
    let mut dropped_by_uid = 0;

    for entry in entries {
        if seen_uids.insert(entry.uid.clone()) {
            by_uid.push(entry);
        } else {
            debug!(uid = %entry.uid, "Dropping entry with duplicate identifier");
            dropped_by_uid += 1;
        }
    }

    let mut seen_keys = HashSet::new();
    let mut survivors = Vec::with_capacity(by_uid.len());
    let mut dropped_by_key = 0;

    for entry in by_uid {
        if seen_keys.insert(entry.duplicate_key()) {
            survivors.push(entry);
        } else {
            debug!(
                uid = %entry.uid,
                title = %entry.title,
                "Dropping entry with duplicate title and time"
            );
            dropped_by_key += 1;
        }
    }

    DedupOutcome {
        entries: survivors,
        dropped_by_uid,
        dropped_by_key,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::SourceLabel;
    use crate::time::EntryTime;
    use chrono::{DateTime, Utc};

    fn at(s: &str) -> EntryTime {
        EntryTime::from_utc(s.parse::<DateTime<Utc>>().unwrap())
    }

    fn entry(uid: &str, title: &str, start: &str, source: &str) -> CalendarEntry {
        CalendarEntry::new(uid, at(start), title).with_source(SourceLabel::new(source))
    }

    fn assert_no_duplicate_candidates(entries: &[CalendarEntry]) {
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                assert_ne!(a.uid, b.uid);
                assert_ne!(a.duplicate_key(), b.duplicate_key());
            }
        }
    }

    #[test]
    fn same_uid_keeps_first_seen() {
        let outcome = deduplicate(vec![
            entry("x1", "Opkomst", "2025-06-01T10:00:00Z", "Welpen"),
            entry("x1", "Opkomst (verplaatst)", "2025-06-02T10:00:00Z", "Groep"),
        ]);

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].title, "Opkomst");
        assert_eq!(outcome.dropped_by_uid, 1);
        assert_eq!(outcome.dropped_by_key, 0);
    }

    #[test]
    fn same_title_and_time_collapse_across_ids() {
        let outcome = deduplicate(vec![
            entry("x1", "Weekendkamp", "2025-06-01T10:00:00Z", "Welpen"),
            entry("x2", "Weekendkamp", "2025-06-01T10:00:00Z", "Groep"),
        ]);

        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].uid, "x1");
        assert_eq!(outcome.dropped_by_key, 1);
    }

    #[test]
    fn different_times_are_kept() {
        let outcome = deduplicate(vec![
            entry("x1", "Opkomst", "2025-06-01T10:00:00Z", "Welpen"),
            entry("x2", "Opkomst", "2025-06-01T10:30:00Z", "Welpen"),
        ]);

        assert_eq!(outcome.entries.len(), 2);
        assert_eq!(outcome.dropped(), 0);
    }

    #[test]
    fn different_end_times_are_kept() {
        let a = entry("x1", "Opkomst", "2025-06-01T10:00:00Z", "Welpen")
            .with_end(at("2025-06-01T12:00:00Z"));
        let b = entry("x2", "Opkomst", "2025-06-01T10:00:00Z", "Welpen")
            .with_end(at("2025-06-01T13:00:00Z"));

        assert_eq!(deduplicate(vec![a, b]).entries.len(), 2);
    }

    #[test]
    fn identifier_pass_runs_before_key_pass() {
        // c shares b's identifier and goes in the first pass; b then loses
        // to a on title and time. c never gets a chance to survive.
        let a = entry("id-a", "Opkomst", "2025-06-01T10:00:00Z", "Welpen");
        let b = entry("id-b", "Opkomst", "2025-06-01T10:00:00Z", "Groep");
        let c = entry("id-b", "Zeilen", "2025-06-08T10:00:00Z", "Groep");

        let outcome = deduplicate(vec![a, b, c]);
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].uid, "id-a");
        assert_eq!(outcome.dropped_by_uid, 1);
        assert_eq!(outcome.dropped_by_key, 1);
    }

    #[test]
    fn preserves_first_seen_order() {
        let outcome = deduplicate(vec![
            entry("c", "Zeilen", "2025-06-15T10:00:00Z", "Welpen"),
            entry("a", "Opkomst", "2025-06-01T10:00:00Z", "Welpen"),
            entry("a", "Opkomst", "2025-06-01T10:00:00Z", "Groep"),
            entry("b", "Hike", "2025-06-08T10:00:00Z", "Groep"),
        ]);

        let uids: Vec<_> = outcome.entries.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["c", "a", "b"]);
    }

    #[test]
    fn output_has_no_duplicate_candidates() {
        let outcome = deduplicate(vec![
            entry("1", "Opkomst", "2025-06-01T10:00:00Z", "A"),
            entry("2", "Opkomst", "2025-06-01T10:00:00Z", "B"),
            entry("2", "Hike", "2025-06-08T10:00:00Z", "B"),
            entry("3", "Hike", "2025-06-08T10:00:00Z", "C"),
            entry("4", "  Hike ", "2025-06-08T10:00:00Z", "C"),
            entry("5", "Zeilen", "2025-06-15T10:00:00Z", "C"),
            entry("1", "Zeilen", "2025-06-22T10:00:00Z", "C"),
        ]);

        assert_no_duplicate_candidates(&outcome.entries);
        let uids: Vec<_> = outcome.entries.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, vec!["1", "3", "5"]);
    }

    #[test]
    fn empty_input() {
        let outcome = deduplicate(Vec::new());
        assert!(outcome.entries.is_empty());
        assert_eq!(outcome.dropped(), 0);
    }
}
