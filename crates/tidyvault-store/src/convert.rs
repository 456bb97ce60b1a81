//! Column conversions between Rust types and SQLite storage classes.

use std::path::Path;

use chrono::{DateTime, Utc};

/// Timestamp to unix milliseconds.
pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

pub(crate) fn from_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Paths are stored as lossy UTF-8 text.
pub(crate) fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip() {
        let now = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(now), 1_700_000_000_123);
    }

    #[test]
    fn test_seconds_drop_fraction() {
        assert_eq!(from_secs(1_700_000_000).timestamp(), 1_700_000_000);
    }
}
