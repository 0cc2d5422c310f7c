//! Timestamp conversions.
//!
//! The server speaks ISO-8601; the local store keeps epoch milliseconds.

use crate::error::MapError;
use chrono::{DateTime, SecondsFormat, Utc};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses an RFC 3339 timestamp into epoch milliseconds.
///
/// # Errors
///
/// Returns [`MapError::InvalidTimestamp`] naming `field` if `value` does
/// not parse.
pub fn parse_iso_millis(field: &'static str, value: &str) -> Result<i64, MapError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| MapError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

/// Formats epoch milliseconds as a UTC RFC 3339 string with millisecond
/// precision. Values outside chrono's range format as the epoch.
pub fn format_iso_millis(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_iso_millis("t", "1970-01-01T00:00:01Z").unwrap(), 1_000);
        assert_eq!(
            parse_iso_millis("t", "1970-01-01T07:00:00.250+07:00").unwrap(),
            250
        );
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_iso_millis("scheduledAt", "tomorrow").unwrap_err();
        assert!(err.to_string().contains("scheduledAt"));
    }

    #[test]
    fn formats_in_utc_with_millis() {
        assert_eq!(format_iso_millis(1_500), "1970-01-01T00:00:01.500Z");
    }

    proptest! {
        #[test]
        fn format_then_parse_is_identity(millis in -62_000_000_000_000i64..250_000_000_000_000i64) {
            prop_assert_eq!(parse_iso_millis("t", &format_iso_millis(millis)).unwrap(), millis);
        }
    }
}
