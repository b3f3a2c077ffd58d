//! Duration and timestamp parsing helpers.
//!
//! Configuration durations use a single-letter suffix (`30s`, `10m`, `24h`,
//! `7d`, `2w`). Maven repositories report metadata mtimes as
//! `yyyyMMddHHmmss`; the wire protocol carries timestamps as `yyyyMMddHHmm`.
//! All timestamps are UTC.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::errors::VtrackError;

/// Format of `versioning/lastUpdated` in maven-metadata.xml.
const LAST_UPDATED_FORMAT: &str = "%Y%m%d%H%M%S";

/// Minute-precision timestamp format used on the query wire protocol.
const WIRE_FORMAT: &str = "%Y%m%d%H%M";

/// Parse a duration with an `s|m|h|d|w` suffix.
pub fn parse_duration(input: &str) -> miette::Result<Duration> {
    let s = input.trim();
    let Some(unit) = s.chars().last() else {
        return Err(VtrackError::Config {
            message: format!("Invalid duration '{input}': empty value"),
        }
        .into());
    };
    let number = &s[..s.len() - unit.len_utf8()];
    let multiplier = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => {
            return Err(VtrackError::Config {
                message: format!("Invalid duration '{input}': expected suffix s|m|h|d|w"),
            }
            .into())
        }
    };
    let value: u64 = number.trim().parse().map_err(|_| VtrackError::Config {
        message: format!("Invalid duration '{input}': '{number}' is not a number"),
    })?;
    Ok(Duration::from_secs(value * multiplier))
}

/// Parse a `yyyyMMddHHmmss` repository timestamp.
pub fn parse_last_updated(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), LAST_UPDATED_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format a timestamp for the wire protocol (`yyyyMMddHHmm`, UTC).
pub fn format_wire_timestamp(value: DateTime<Utc>) -> String {
    value.format(WIRE_FORMAT).to_string()
}

/// Parse a wire protocol timestamp.
pub fn parse_wire_timestamp(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), WIRE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn durations_with_suffixes() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_duration("24h").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604_800));
        assert_eq!(parse_duration("2w").unwrap(), Duration::from_secs(1_209_600));
    }

    #[test]
    fn duration_rejects_missing_suffix() {
        assert!(parse_duration("30").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("x5s").is_err());
    }

    #[test]
    fn last_updated_round_trip() {
        let ts = parse_last_updated("20240101120000").unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(ts, expected);
    }

    #[test]
    fn last_updated_rejects_garbage() {
        assert!(parse_last_updated("not-a-date").is_none());
        assert!(parse_last_updated("2024").is_none());
    }

    #[test]
    fn wire_timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2022, 7, 20, 10, 11, 0).unwrap();
        let formatted = format_wire_timestamp(ts);
        assert_eq!(formatted, "202207201011");
        assert_eq!(parse_wire_timestamp(&formatted), Some(ts));
    }
}
