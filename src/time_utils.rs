//! Small time helpers shared by the document model, the database, and the
//! status strip.

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

const DATE_FMT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");
const CLOCK_FMT: &[FormatItem<'_>] = format_description!("[hour]:[minute]");
const TIMESTAMP_FMT: &[FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// Local time with UTC fallback if the local offset cannot be determined.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `2024-07-01` style date.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FMT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(s: &str) -> Option<Date> {
    Date::parse(s, DATE_FMT).ok()
}

/// `10:30` style wall-clock time for the status strip and sprint headers.
pub fn format_clock(dt: OffsetDateTime) -> String {
    dt.format(CLOCK_FMT).unwrap_or_default()
}

/// ISO timestamp without an offset, used in export filenames.
pub fn format_timestamp(dt: OffsetDateTime) -> String {
    dt.format(TIMESTAMP_FMT).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn date_round_trip() {
        let d = parse_date("2024-07-01").unwrap();
        assert_eq!(format_date(d), "2024-07-01");
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn clock_and_timestamp_formats() {
        let dt = datetime!(2024-07-01 10:30:45 UTC);
        assert_eq!(format_clock(dt), "10:30");
        assert_eq!(format_timestamp(dt), "2024-07-01T10:30:45");
    }
}
