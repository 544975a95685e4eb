//! Timestamp utilities
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings
//! (`2026-03-02T09:00:00.000000Z`), so SQL string comparison orders them
//! chronologically.

use chrono::{DateTime, Datelike, Duration, NaiveTime, SecondsFormat, SubsecRound, Utc};

use crate::{Error, Result};

/// Current UTC time at storage precision (microseconds)
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Format a timestamp for storage
pub fn to_db(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored RFC 3339 timestamp
pub fn parse_db(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

/// Monday 00:00 UTC of the week containing `ts`
pub fn week_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = ts.weekday().num_days_from_monday() as i64;
    let monday = ts.date_naive() - Duration::days(days_from_monday);
    monday.and_time(NaiveTime::MIN).and_utc()
}

/// Monday 00:00 UTC of the last fully elapsed week before `ts`
pub fn previous_week_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    week_start(ts) - Duration::days(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_utc(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01 00:00:00 UTC
    }

    #[test]
    fn test_db_roundtrip() {
        let ts = parse_utc("2026-03-04T12:30:00Z");
        assert_eq!(parse_db(&to_db(ts)).unwrap(), ts);
    }

    #[test]
    fn test_db_format_sorts_chronologically() {
        let earlier = to_db(parse_utc("2026-03-04T09:59:59.5Z"));
        let later = to_db(parse_utc("2026-03-04T10:00:00Z"));
        assert_eq!(later, "2026-03-04T10:00:00.000000Z");
        assert!(earlier < later);
    }

    #[test]
    fn test_now_roundtrips_exactly() {
        let ts = now();
        assert_eq!(parse_db(&to_db(ts)).unwrap(), ts);
    }

    #[test]
    fn test_parse_db_rejects_garbage() {
        assert!(parse_db("yesterday").is_err());
    }

    #[test]
    fn test_week_start_midweek() {
        // 2026-03-04 is a Wednesday
        let ts = parse_utc("2026-03-04T15:45:00Z");
        assert_eq!(week_start(ts), parse_utc("2026-03-02T00:00:00Z"));
    }

    #[test]
    fn test_week_start_on_monday_midnight() {
        let ts = parse_utc("2026-03-02T00:00:00Z");
        assert_eq!(week_start(ts), ts);
    }

    #[test]
    fn test_week_start_sunday_belongs_to_previous_monday() {
        let ts = parse_utc("2026-03-08T23:59:59Z");
        assert_eq!(week_start(ts), parse_utc("2026-03-02T00:00:00Z"));
    }

    #[test]
    fn test_previous_week_start() {
        let ts = parse_utc("2026-03-09T09:00:00Z");
        assert_eq!(previous_week_start(ts), parse_utc("2026-03-02T00:00:00Z"));
    }
}
