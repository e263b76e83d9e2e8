//! Duration strings in the style of Go's `time.Duration` format.
//!
//! Settings, sprint records, and the database all carry durations as strings
//! like `1h30m` or `300ms`.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid duration string; expected number")]
    ExpectedNumber,
    #[error("invalid duration string; expected unit")]
    ExpectedUnit,
    #[error("negative durations are not supported")]
    Negative,
}

const UNITS: &[(&str, u128)] = &[
    ("ms", 1_000_000),
    ("us", 1_000),
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
];

/// Formats a duration as the shortest exact Go-style string.
pub fn format_duration(val: Duration) -> String {
    if val.is_zero() {
        return "0".to_string();
    }
    let nanos = val.as_nanos();

    // sub-second durations render as a fraction of a single unit
    if nanos < 1_000_000 {
        return format!("{}us", nanos / 1_000);
    }
    if nanos < 1_000_000_000 {
        let millis = nanos as f64 / 1_000_000.0;
        return format!("{}ms", trim_float(millis));
    }

    let mut out = String::new();
    let mut rest = nanos;
    let hours = rest / 3_600_000_000_000;
    rest %= 3_600_000_000_000;
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    let minutes = rest / 60_000_000_000;
    rest %= 60_000_000_000;
    if minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if rest > 0 {
        let seconds = rest as f64 / 1_000_000_000.0;
        out.push_str(&format!("{}s", trim_float(seconds)));
    }
    out
}

fn trim_float(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as u64)
    } else {
        format!("{v}")
    }
}

/// Renders a countdown as `MM:SS` or `H:MM:SS`, clamped to whole seconds.
pub fn timer_display(val: Duration) -> String {
    let total = val.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Parses a Go-style duration string: one or more `<number><unit>` groups,
/// where numbers may be fractional and units are `h`, `m`, `s`, `ms`, `us`.
pub fn parse_duration(val: &str) -> Result<Duration, DurationParseError> {
    let mut rest = val;
    if let Some(stripped) = rest.strip_prefix('-') {
        if !stripped.is_empty() {
            return Err(DurationParseError::Negative);
        }
    }
    rest = rest.strip_prefix('+').unwrap_or(rest);
    if rest.is_empty() {
        return Err(DurationParseError::Empty);
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }

    let mut accum_nanos: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (number_part, after) = rest.split_at(number_len);
        if number_part.is_empty() || !number_part.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(DurationParseError::ExpectedNumber);
        }
        let number: f64 = number_part
            .parse()
            .map_err(|_| DurationParseError::ExpectedNumber)?;
        let Some((unit, unit_nanos)) = UNITS
            .iter()
            .find(|(name, _)| after.starts_with(name))
            .copied()
        else {
            return Err(DurationParseError::ExpectedUnit);
        };
        rest = &after[unit.len()..];
        accum_nanos += (number * unit_nanos as f64).round() as u128;
    }

    Ok(Duration::new(
        (accum_nanos / 1_000_000_000) as u64,
        (accum_nanos % 1_000_000_000) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_compound_durations() {
        assert_eq!(format_duration(Duration::ZERO), "0");
        assert_eq!(format_duration(Duration::from_secs(90 * 60)), "1h30m");
        assert_eq!(format_duration(Duration::from_secs(15 * 60)), "15m");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h1s");
        assert_eq!(format_duration(Duration::from_millis(300)), "300ms");
        assert_eq!(format_duration(Duration::from_micros(250)), "250us");
    }

    #[test]
    fn parses_compound_durations() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(
            parse_duration("1h30m").unwrap(),
            Duration::from_secs(5400)
        );
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("300ms").unwrap(), Duration::from_millis(300));
    }

    #[test]
    fn round_trips() {
        for s in ["1h", "15m", "1h30m", "45s", "2h5m30s", "300ms"] {
            let parsed = parse_duration(s).unwrap();
            assert_eq!(format_duration(parsed), s, "round trip of {s}");
        }
    }

    #[test]
    fn rejects_malformed_strings() {
        assert_eq!(parse_duration(""), Err(DurationParseError::Empty));
        assert_eq!(parse_duration("h"), Err(DurationParseError::ExpectedNumber));
        assert_eq!(parse_duration("15"), Err(DurationParseError::ExpectedUnit));
        assert_eq!(parse_duration("15x"), Err(DurationParseError::ExpectedUnit));
        assert_eq!(parse_duration("-5m"), Err(DurationParseError::Negative));
    }

    #[test]
    fn timer_display_clamps_to_seconds() {
        assert_eq!(timer_display(Duration::ZERO), "00:00");
        assert_eq!(timer_display(Duration::from_secs(65)), "01:05");
        assert_eq!(timer_display(Duration::from_secs(3605)), "1:00:05");
        assert_eq!(timer_display(Duration::from_millis(1500)), "00:01");
    }
}
