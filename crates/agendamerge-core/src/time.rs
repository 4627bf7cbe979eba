//! Time types for calendar entries.
//!
//! Source feeds express start and end times in four shapes: all-day dates,
//! UTC datetimes, floating (local wall-clock) datetimes and datetimes
//! qualified by a `TZID`. [`EntryTime`] keeps the shape it was read in so the
//! merged feed can be written back without loss, while [`TimeKey`] gives the
//! instant-based view used when comparing entries across sources.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// The time of a calendar entry, as expressed by its source feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum EntryTime {
    /// An all-day date (no specific time).
    Date(NaiveDate),
    /// A specific instant in UTC.
    Utc(DateTime<Utc>),
    /// A wall-clock time with no timezone attached.
    Floating(NaiveDateTime),
    /// A wall-clock time in a named timezone.
    Zoned {
        date_time: NaiveDateTime,
        tzid: String,
    },
}

impl EntryTime {
    /// Creates an all-day entry time.
    pub fn from_date(date: NaiveDate) -> Self {
        Self::Date(date)
    }

    /// Creates a UTC entry time.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self::Utc(dt)
    }

    /// Creates an entry time in a named timezone.
    pub fn zoned(date_time: NaiveDateTime, tzid: impl Into<String>) -> Self {
        Self::Zoned {
            date_time,
            tzid: tzid.into(),
        }
    }

    /// Returns `true` if this is an all-day date.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Returns the key used to decide whether two times denote the same moment.
    ///
    /// UTC times and zoned times with a resolvable IANA timezone collapse to
    /// the same [`TimeKey::Instant`]. Zoned times that cannot be resolved
    /// keep their wall-clock value and TZID.
    pub fn key(&self) -> TimeKey {
        match self {
            Self::Date(date) => TimeKey::Date(*date),
            Self::Utc(dt) => TimeKey::Instant(*dt),
            Self::Floating(naive) => TimeKey::Wall(*naive),
            Self::Zoned { date_time, tzid } => match resolve_zoned(date_time, tzid) {
                Some(instant) => TimeKey::Instant(instant),
                None => TimeKey::Zoned(*date_time, tzid.clone()),
            },
        }
    }

    /// Converts to a UTC datetime, treating dates as midnight UTC and
    /// unresolvable wall-clock times as if they were UTC.
    pub fn to_utc_lossy(&self) -> DateTime<Utc> {
        match self {
            Self::Date(date) => date.and_time(chrono::NaiveTime::MIN).and_utc(),
            Self::Utc(dt) => *dt,
            Self::Floating(naive) => naive.and_utc(),
            Self::Zoned { date_time, tzid } => {
                resolve_zoned(date_time, tzid).unwrap_or_else(|| date_time.and_utc())
            }
        }
    }

    /// Adds a duration, keeping the time's shape.
    ///
    /// All-day dates only move by whole days. Zoned and floating times move
    /// on the wall clock. Returns `None` on overflow.
    pub fn checked_add(&self, duration: Duration) -> Option<Self> {
        match self {
            Self::Date(date) => date
                .checked_add_signed(Duration::days(duration.num_days()))
                .map(Self::Date),
            Self::Utc(dt) => dt.checked_add_signed(duration).map(Self::Utc),
            Self::Floating(naive) => naive.checked_add_signed(duration).map(Self::Floating),
            Self::Zoned { date_time, tzid } => {
                date_time
                    .checked_add_signed(duration)
                    .map(|date_time| Self::Zoned {
                        date_time,
                        tzid: tzid.clone(),
                    })
            }
        }
    }
}

/// Parses an iCalendar `DURATION` value such as `PT1H30M`, `P1D` or `-P2W`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    let (negative, rest) = match value.as_bytes().first()? {
        b'-' => (true, &value[1..]),
        b'+' => (false, &value[1..]),
        _ => (false, value),
    };
    let rest = rest.strip_prefix(['P', 'p'])?;

    let mut total = Duration::zero();
    let mut digits = String::new();
    let mut in_time = false;
    let mut any = false;

    for c in rest.chars() {
        match c.to_ascii_uppercase() {
            '0'..='9' => digits.push(c),
            'T' if digits.is_empty() && !in_time => in_time = true,
            unit => {
                let n: i64 = digits.parse().ok()?;
                digits.clear();
                let part = match (unit, in_time) {
                    ('W', false) => Duration::try_weeks(n)?,
                    ('D', false) => Duration::try_days(n)?,
                    ('H', true) => Duration::try_hours(n)?,
                    ('M', true) => Duration::try_minutes(n)?,
                    ('S', true) => Duration::try_seconds(n)?,
                    _ => return None,
                };
                total = total.checked_add(&part)?;
                any = true;
            }
        }
    }

    if !digits.is_empty() || !any {
        return None;
    }
    Some(if negative { -total } else { total })
}

/// Comparison key for entry times.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimeKey {
    Date(NaiveDate),
    Instant(DateTime<Utc>),
    Wall(NaiveDateTime),
    Zoned(NaiveDateTime, String),
}

fn resolve_zoned(date_time: &NaiveDateTime, tzid: &str) -> Option<DateTime<Utc>> {
    let tz: Tz = tzid.trim().trim_start_matches('/').parse().ok()?;
    tz.from_local_datetime(date_time)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse_duration("PT2H"), Some(Duration::hours(2)));
        assert_eq!(
            parse_duration("PT1H30M"),
            Some(Duration::minutes(90))
        );
        assert_eq!(
            parse_duration("P1DT12H"),
            Some(Duration::hours(36))
        );
        assert_eq!(parse_duration("P2W"), Some(Duration::days(14)));
        assert_eq!(parse_duration("-PT15M"), Some(Duration::minutes(-15)));
        assert_eq!(parse_duration("PT45S"), Some(Duration::seconds(45)));
    }

    #[test]
    fn rejects_malformed_durations() {
        for value in ["", "P", "PT", "2H", "PT2", "P1H", "PT1D", "P1X"] {
            assert_eq!(parse_duration(value), None, "{value}");
        }
    }

    #[test]
    fn adding_keeps_shape() {
        let zoned = EntryTime::zoned(naive("2025-06-01T10:00:00"), "Europe/Amsterdam");
        assert_eq!(
            zoned.checked_add(Duration::hours(2)),
            Some(EntryTime::zoned(naive("2025-06-01T12:00:00"), "Europe/Amsterdam"))
        );

        let utc = EntryTime::from_utc("2025-06-01T10:00:00Z".parse().unwrap());
        assert_eq!(
            utc.checked_add(Duration::minutes(30)),
            Some(EntryTime::from_utc("2025-06-01T10:30:00Z".parse().unwrap()))
        );

        let date = EntryTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert_eq!(
            date.checked_add(Duration::days(2)),
            Some(EntryTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 3).unwrap()))
        );
    }

    #[test]
    fn utc_and_zoned_share_instant_key() {
        let utc = EntryTime::from_utc("2025-06-01T08:00:00Z".parse().unwrap());
        let zoned = EntryTime::zoned(naive("2025-06-01T10:00:00"), "Europe/Amsterdam");

        assert_eq!(utc.key(), zoned.key());
        assert_ne!(utc, zoned);
    }

    #[test]
    fn unknown_tzid_keeps_wall_clock() {
        let zoned = EntryTime::zoned(naive("2025-06-01T10:00:00"), "Custom/Nowhere");
        assert_eq!(
            zoned.key(),
            TimeKey::Zoned(naive("2025-06-01T10:00:00"), "Custom/Nowhere".to_string())
        );
        assert_eq!(
            zoned.to_utc_lossy(),
            "2025-06-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }

    #[test]
    fn floating_differs_from_utc() {
        let floating = EntryTime::Floating(naive("2025-06-01T10:00:00"));
        let utc = EntryTime::from_utc("2025-06-01T10:00:00Z".parse().unwrap());
        assert_ne!(floating.key(), utc.key());
    }

    #[test]
    fn date_to_utc_is_midnight() {
        let date = EntryTime::from_date(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap());
        assert!(date.is_all_day());
        assert_eq!(
            date.to_utc_lossy(),
            "2025-06-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap()
        );
    }
}
