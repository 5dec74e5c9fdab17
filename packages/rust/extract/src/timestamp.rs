//! Timestamp canonicalization.
//!
//! Oracle output carries dates in whatever shape the transcript used. Every
//! timestamp field is funnelled through [`normalize_timestamp`], which yields
//! either an RFC 3339 string or [`NO_TIMESTAMP`]. It never fails.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Timelike};

use tourledger_shared::NO_TIMESTAMP;

/// Offset-aware formats tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Naive formats, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
];

/// Canonicalize a timestamp token.
///
/// Empty, unparsable, and date-only inputs map to `"none"`, as does any
/// value landing exactly on midnight: a date the oracle padded with
/// `00:00:00` carries no time-of-day signal.
pub fn normalize_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(dt) if !is_midnight(&dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        _ => NO_TIMESTAMP.to_string(),
    }
}

/// Parse a timestamp in any accepted shape, keeping its offset.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let text = raw.trim();
    if text.is_empty() || text.eq_ignore_ascii_case(NO_TIMESTAMP) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc().fixed_offset());
        }
    }

    None
}

fn is_midnight(dt: &DateTime<FixedOffset>) -> bool {
    dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 && dt.nanosecond() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midnight_becomes_none() {
        assert_eq!(normalize_timestamp("2025-04-23T00:00:00+00:00"), "none");
        assert_eq!(normalize_timestamp("2025-04-23 00:00"), "none");
    }

    #[test]
    fn canonical_input_is_unchanged() {
        assert_eq!(
            normalize_timestamp("2025-04-23T21:28:22+00:00"),
            "2025-04-23T21:28:22+00:00"
        );
    }

    #[test]
    fn empty_and_garbage_become_none() {
        assert_eq!(normalize_timestamp(""), "none");
        assert_eq!(normalize_timestamp("   "), "none");
        assert_eq!(normalize_timestamp("garbage"), "none");
        assert_eq!(normalize_timestamp("none"), "none");
        assert_eq!(normalize_timestamp("Not mentioned"), "none");
    }

    #[test]
    fn date_only_becomes_none() {
        assert_eq!(normalize_timestamp("2025-04-23"), "none");
    }

    #[test]
    fn zero_fraction_and_zulu_are_canonicalized() {
        assert_eq!(
            normalize_timestamp("2025-04-23T21:28:22.000+00:00"),
            "2025-04-23T21:28:22+00:00"
        );
        assert_eq!(
            normalize_timestamp("2025-04-23T21:28:22Z"),
            "2025-04-23T21:28:22+00:00"
        );
    }

    #[test]
    fn offsets_are_preserved() {
        assert_eq!(
            normalize_timestamp("2025-04-26T10:00:00-05:00"),
            "2025-04-26T10:00:00-05:00"
        );
    }

    #[test]
    fn naive_and_us_formats_read_as_utc() {
        assert_eq!(
            normalize_timestamp("2025-04-26 10:30:00"),
            "2025-04-26T10:30:00+00:00"
        );
        assert_eq!(
            normalize_timestamp("04/26/2025 10:00 AM"),
            "2025-04-26T10:00:00+00:00"
        );
        assert_eq!(
            normalize_timestamp("April 26, 2025 2:00 PM"),
            "2025-04-26T14:00:00+00:00"
        );
    }

    #[test]
    fn fractional_seconds_survive() {
        assert_eq!(
            normalize_timestamp("2025-05-15T10:42:08.250+00:00"),
            "2025-05-15T10:42:08.250+00:00"
        );
    }
}
