//! Timestamp helpers shared by every table that stores instants as TEXT.
//!
//! All stored timestamps use one fixed-width UTC form
//! (`2024-03-01T12:00:00.000Z`) so SQL string comparison and `ORDER BY`
//! follow chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format `dt` in the canonical stored form.
pub fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse any RFC 3339 timestamp into UTC.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_width_output() {
        let a = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(format_ts(a), "2023-01-01T00:00:00.000Z");
    }

    #[test]
    fn string_order_is_time_order() {
        let a = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(5);
        let c = a + chrono::Duration::days(40);
        assert!(format_ts(a) < format_ts(b));
        assert!(format_ts(b) < format_ts(c));
    }

    #[test]
    fn parse_normalises_offset() {
        let dt = parse_ts("2023-02-01T02:00:00+02:00").unwrap();
        assert_eq!(format_ts(dt), "2023-02-01T00:00:00.000Z");
    }
}
