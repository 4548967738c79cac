//! Prometheus-style duration strings.
//!
//! Durations are written as descending unit groups without separators:
//! `1w2d`, `90m`, `1h30m`, `500ms`. Units are y, w, d, h, m, s and ms.

use chrono::Duration;
use thiserror::Error;

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

/// Units in the order they must appear
const UNITS: [(&str, i64); 7] = [
    ("y", 365 * MS_PER_DAY),
    ("w", 7 * MS_PER_DAY),
    ("d", MS_PER_DAY),
    ("h", MS_PER_HOUR),
    ("m", MS_PER_MINUTE),
    ("s", MS_PER_SECOND),
    ("ms", 1),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,

    #[error("not a valid duration string: {0:?}")]
    Invalid(String),
}

/// Parse a duration such as `2h` or `1d12h`
pub fn parse_duration(text: &str) -> Result<Duration, DurationError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DurationError::Empty);
    }
    if text == "0" {
        return Ok(Duration::zero());
    }

    let invalid = || DurationError::Invalid(text.to_string());
    let bytes = text.as_bytes();
    let mut pos = 0;
    let mut last_unit: Option<usize> = None;
    let mut total_ms: i64 = 0;

    while pos < bytes.len() {
        let digits_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == digits_start {
            return Err(invalid());
        }
        let value: i64 = text[digits_start..pos].parse().map_err(|_| invalid())?;

        let unit_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        let unit = &text[unit_start..pos];
        let index = UNITS
            .iter()
            .position(|(name, _)| *name == unit)
            .ok_or_else(invalid)?;
        if last_unit.is_some_and(|last| index <= last) {
            return Err(invalid());
        }
        last_unit = Some(index);

        total_ms = value
            .checked_mul(UNITS[index].1)
            .and_then(|ms| total_ms.checked_add(ms))
            .ok_or_else(invalid)?;
    }

    Ok(Duration::milliseconds(total_ms))
}

/// Render a duration in the same format `parse_duration` accepts.
/// Years and weeks are only used when they divide the remainder exactly.
pub fn humanize_duration(d: Duration) -> String {
    let mut ms = d.num_milliseconds().abs();
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (i, (unit, mult)) in UNITS.iter().enumerate() {
        let exact_only = i < 2;
        if exact_only && ms % mult != 0 {
            continue;
        }
        let count = ms / mult;
        if count > 0 {
            out.push_str(&format!("{}{}", count, unit));
            ms -= count * mult;
        }
    }
    out
}

/// Round to the nearest multiple of `unit`, halves away from zero
pub fn round_duration(d: Duration, unit: Duration) -> Duration {
    let unit_ms = unit.num_milliseconds();
    if unit_ms <= 0 {
        return d;
    }
    let ms = d.num_milliseconds();
    let half = unit_ms / 2;
    let rounded = if ms >= 0 {
        (ms + half) / unit_ms * unit_ms
    } else {
        -((-ms + half) / unit_ms * unit_ms)
    };
    Duration::milliseconds(rounded)
}

/// Describe how long ago `d` was: hour precision above a day, minute precision below
pub fn describe_age(d: Duration) -> String {
    if d > Duration::hours(24) {
        humanize_duration(round_duration(d, Duration::hours(1)))
    } else {
        humanize_duration(round_duration(d, Duration::minutes(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_duration("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::minutes(90));
        assert_eq!(parse_duration("1w2d").unwrap(), Duration::days(9));
        assert_eq!(parse_duration("1m500ms").unwrap(), Duration::milliseconds(60_500));
        assert_eq!(parse_duration("0").unwrap(), Duration::zero());
    }

    #[test]
    fn test_parse_invalid() {
        assert_eq!(parse_duration(""), Err(DurationError::Empty));
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("30m1h").is_err());
        assert!(parse_duration("1h1h").is_err());
        assert!(parse_duration("1x").is_err());
        assert!(parse_duration("-1h").is_err());
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize_duration(Duration::zero()), "0s");
        assert_eq!(humanize_duration(Duration::days(7)), "1w");
        assert_eq!(humanize_duration(Duration::days(8)), "8d");
        assert_eq!(humanize_duration(Duration::minutes(90)), "1h30m");
        assert_eq!(humanize_duration(Duration::milliseconds(1500)), "1s500ms");
    }

    #[test]
    fn test_describe_age() {
        let d = Duration::hours(50) + Duration::minutes(31);
        assert_eq!(describe_age(d), "2d3h");

        let d = Duration::hours(3) + Duration::seconds(89);
        assert_eq!(describe_age(d), "3h1m");
    }
}
