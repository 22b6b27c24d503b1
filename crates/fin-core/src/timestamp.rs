//! Minute-precision timestamps and calendar dates as they appear in documents.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};

const MINUTE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

time::serde::format_description!(pub iso_date, Date, "[year]-[month]-[day]");

/// Format a timestamp as `YYYY-MM-DD HH:MM` in UTC.
#[must_use]
pub fn format_minute(ts: OffsetDateTime) -> String {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc.format(MINUTE_FORMAT).unwrap_or_else(|_| utc.to_string())
}

/// Parse a `YYYY-MM-DD HH:MM` timestamp, interpreted as UTC.
///
/// # Errors
/// Returns [`time::error::Parse`] when the input does not match the format.
pub fn parse_minute(input: &str) -> Result<OffsetDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(input.trim(), MINUTE_FORMAT).map(PrimitiveDateTime::assume_utc)
}

/// Format a calendar date as `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())
}

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`time::error::Parse`] when the input is not a valid date.
pub fn parse_date(input: &str) -> Result<Date, time::error::Parse> {
    Date::parse(input.trim(), DATE_FORMAT)
}

/// Current instant truncated to whole seconds.
#[must_use]
pub fn now() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_nanosecond(0).unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn minute_format_drops_seconds() {
        let ts = datetime!(2025-07-30 09:15:42 UTC);
        assert_eq!(format_minute(ts), "2025-07-30 09:15");
    }

    #[test]
    fn minute_format_normalizes_to_utc() {
        let ts = datetime!(2025-07-30 09:15 +2);
        assert_eq!(format_minute(ts), "2025-07-30 07:15");
    }

    #[test]
    fn parse_minute_accepts_document_format() {
        let ts = parse_minute("2024-01-01 10:00").unwrap_or_else(|err| panic!("must parse: {err}"));
        assert_eq!(ts, datetime!(2024-01-01 10:00 UTC));
    }

    #[test]
    fn parse_minute_rejects_other_shapes() {
        assert!(parse_minute("2024-01-01").is_err());
        assert!(parse_minute("2024-1-1 10:00").is_err());
        assert!(parse_minute("2024-01-01T10:00").is_err());
    }

    #[test]
    fn dates_roundtrip() {
        let parsed = parse_date("2025-06-17").unwrap_or_else(|err| panic!("must parse: {err}"));
        assert_eq!(parsed, date!(2025-06-17));
        assert_eq!(format_date(parsed), "2025-06-17");
        assert!(parse_date("2025-02-30").is_err());
    }
}
