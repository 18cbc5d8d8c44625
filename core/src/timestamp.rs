use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamp format used everywhere on the wire: query parameters, message
/// `date` fields, and checkpoint documents.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S+00:00";

/// Parse a timestamp in the exchange format. The remote API only speaks
/// UTC with an explicit `+00:00` offset, so anything else is rejected.
pub fn parse(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| Error::Timestamp {
            value: value.to_string(),
        })
}

pub fn format(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Format for query-string parameters: offset-less UTC. A literal `+00:00`
/// in a query would be read back as `" 00:00"` by servers that apply
/// form-urlencoded decoding, so the offset stays off the wire entirely.
pub fn format_query(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_exchange_format() {
        let ts = parse("2023-01-01T00:05:00+00:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2023, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn round_trips_through_format() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 15, 12, 30, 45).unwrap();
        assert_eq!(parse(&format(ts)).unwrap(), ts);
    }

    #[test]
    fn query_format_carries_no_offset() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(format_query(ts), "2023-01-01T00:05:00");
    }

    #[test]
    fn rejects_other_offsets_and_garbage() {
        assert!(parse("2023-01-01T00:05:00Z").is_err());
        assert!(parse("2023-01-01 00:05:00").is_err());
        assert!(parse("not a date").is_err());
    }
}
