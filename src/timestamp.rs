use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::SpinnakerError;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// ISO 8601 in UTC without offset, microsecond precision.
pub fn format(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// Accepts RFC 3339 and naive ISO 8601; naive values are taken as UTC.
pub fn parse(value: &str) -> Result<DateTime<Utc>, SpinnakerError> {
    let trimmed = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(instant.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(SpinnakerError::TimestampParse {
        timestamp: value.to_string(),
        message: "expected ISO 8601 date and time".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn round_trips_own_format() {
        let instant = Utc.with_ymd_and_hms(2017, 3, 1, 12, 30, 5).unwrap();
        let text = format(instant);
        assert_eq!(text, "2017-03-01T12:30:05.000000");
        assert_eq!(parse(&text).unwrap(), instant);
    }

    #[test]
    fn parses_offsets_and_spaces() {
        let expected = Utc.with_ymd_and_hms(2017, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse("2017-03-01T14:00:00+02:00").unwrap(), expected);
        assert_eq!(parse("2017-03-01 12:00:00").unwrap(), expected);
        assert_eq!(parse("2017-03-01T12:00:00Z").unwrap(), expected);
    }

    #[test]
    fn rejects_garbage() {
        assert_matches!(parse("yesterday"), Err(SpinnakerError::TimestampParse { .. }));
    }
}
