//! Timestamp parsing and rendering for fact validity intervals.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Format a UTC timestamp as ISO 8601 with a `Z` suffix, second precision.
///
/// Used wherever timestamps are shown to the oracle or rendered into a
/// retrieval context, so both sides of the pipeline speak the same format.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse a datetime string in the formats extraction responses actually
/// contain into a UTC [`DateTime`].
///
/// Accepts, from most to least specific:
/// - RFC 3339 / ISO 8601 with timezone (`2024-01-15T10:30:00Z`, `…+05:00`)
/// - ISO 8601 without timezone, with or without sub-seconds, read as UTC
/// - `YYYY-MM-DD`, `YYYY-MM`, and `YYYY`, widened to the first UTC midnight
///   they cover
///
/// The partial calendar forms matter because extraction prompts ask for
/// ISO 8601 but source text often pins a fact only to a month or a year.
/// Surrounding whitespace is ignored; anything else yields `None`.
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Zone-less timestamps are read as UTC.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }

    let midnight = partial_date(s)?.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// `YYYY-MM-DD`, `YYYY-MM`, or `YYYY`, widened to the first day they cover.
fn partial_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    match (s.len(), s.as_bytes()) {
        (7, bytes) if bytes[4] == b'-' => {
            NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()
        }
        (4, bytes) if bytes.iter().all(|b| b.is_ascii_digit()) => {
            NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1)
        }
        _ => None,
    }
}
