//! Time utility functions

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Naive date-time layouts accepted after RFC 3339 fails (interpreted as UTC)
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Convert milliseconds since Unix epoch to DateTime<Utc>
pub fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Parse a date or date-time literal to DateTime<Utc>.
///
/// Accepts RFC 3339 (`2024-01-15T10:30:00Z`, `2024-01-15T10:30:00+05:00`),
/// OData shorthand without seconds (`2024-01-15T10:30Z`), naive date-times
/// (read as UTC) and plain dates (`2024-01-15`, midnight UTC).
pub fn parse_date_value(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // `hh:mm` with zone: widen to `hh:mm:00` and retry as RFC 3339
    if let Some(widened) = widen_short_time(value)
        && let Ok(dt) = DateTime::parse_from_rfc3339(&widened)
    {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Format a DateTime<Utc> as RFC 3339 with millisecond precision
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Insert `:00` seconds into `YYYY-MM-DDThh:mm<zone>`
fn widen_short_time(value: &str) -> Option<String> {
    let (date, time) = value.split_once('T')?;
    let zone_at = time.find(['Z', '+', '-'])?;
    let (clock, zone) = time.split_at(zone_at);
    if clock.len() == 5 && clock.as_bytes()[2] == b':' {
        Some(format!("{}T{}:00{}", date, clock, zone))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_date_value_rfc3339() {
        let dt = parse_date_value("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_date_value_with_offset() {
        let dt = parse_date_value("2024-01-15T10:30:00+05:00").unwrap();
        // 10:30 at +05:00 is 05:30 UTC
        assert_eq!(dt.hour(), 5);
        assert_eq!(dt.minute(), 30);
    }

    #[test]
    fn test_parse_date_value_short_time_with_zone() {
        let dt = parse_date_value("2024-01-15T10:30Z").unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.second(), 0);
    }

    #[test]
    fn test_parse_date_value_naive_datetime() {
        let dt = parse_date_value("2024-01-15T10:30:45.250").unwrap();
        assert_eq!(dt.second(), 45);
        assert_eq!(dt.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_parse_date_value_plain_date() {
        let dt = parse_date_value("2024-03-01").unwrap();
        assert_eq!(dt.day(), 1);
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_date_value_invalid() {
        assert!(parse_date_value("not-a-date").is_none());
        assert!(parse_date_value("2024-13-45").is_none());
        assert!(parse_date_value("").is_none());
    }

    #[test]
    fn test_millis_to_datetime_known_value() {
        // 2024-01-01 00:00:00 UTC = 1704067200 seconds
        let dt = millis_to_datetime(1_704_067_200_000).unwrap();
        assert_eq!(dt.year(), 2024);
        assert_eq!(dt.month(), 1);
        assert_eq!(dt.day(), 1);
    }

    #[test]
    fn test_format_datetime_millis() {
        let dt = parse_date_value("2024-01-15T10:30:00Z").unwrap();
        assert_eq!(format_datetime(&dt), "2024-01-15T10:30:00.000Z");
    }
}
