//! Timestamp formatting shared by persisted documents and the status file.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall clock as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn iso_now() -> String {
    iso_from(Utc::now())
}

/// ISO-8601 UTC rendering with second precision.
pub fn iso_from(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp, tolerating offsets other than `Z`.
pub fn parse_iso(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
