use std::{convert::Infallible, str::FromStr};

use chrono::{
    DateTime, FixedOffset, Local, SecondsFormat, Utc,
    format::{Item, StrftimeItems},
};
use chrono_tz::Tz;

/// Default header format, e.g. `2025-12-18 10:30:00.123`.
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// How the timestamp of each log line is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFormat {
    /// A strftime pattern.
    Pattern(String),
    /// Milliseconds since the Unix epoch.
    Timestamp,
    /// RFC 3339 in UTC with milliseconds.
    Iso,
    /// `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    Gmt,
    /// RFC 3339 in UTC with whole seconds.
    Utc,
}

impl Default for TimeFormat {
    fn default() -> Self {
        TimeFormat::Pattern(DEFAULT_TIME_FORMAT.to_string())
    }
}

impl FromStr for TimeFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "timestamp" => TimeFormat::Timestamp,
            "ISO" => TimeFormat::Iso,
            "GMT" => TimeFormat::Gmt,
            "UTC" => TimeFormat::Utc,
            pattern => TimeFormat::Pattern(pattern.to_string()),
        })
    }
}

impl From<&str> for TimeFormat {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(format) => format,
            Err(never) => match never {},
        }
    }
}

/// Parses `UTC`, `GMT`, `Z` or a fixed offset such as `+08:00`, `-0530`, `+8`.
pub fn parse_timezone(name: &str) -> Option<FixedOffset> {
    let name = name.trim();
    if matches!(name.to_ascii_uppercase().as_str(), "UTC" | "GMT" | "Z") {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match name.as_bytes().first()? {
        b'+' => (1, &name[1..]),
        b'-' => (-1, &name[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = if digits.len() <= 2 {
        (digits.parse::<i32>().ok()?, 0)
    } else {
        let split = digits.len() - 2;
        (digits[..split].parse::<i32>().ok()?, digits[split..].parse::<i32>().ok()?)
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A time zone a timestamp can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Zone {
    Fixed(FixedOffset),
    /// IANA name such as `Asia/Shanghai`.
    Named(Tz),
}

/// Resolves `name` as a fixed offset first, then as an IANA zone name.
pub fn resolve_timezone(name: &str) -> Option<Zone> {
    parse_timezone(name)
        .map(Zone::Fixed)
        .or_else(|| name.trim().parse::<Tz>().ok().map(Zone::Named))
}

fn is_valid_pattern(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Renders `now` according to `format`.
///
/// Patterns are rendered in `timezone` when it resolves to an offset or an
/// IANA zone, local time otherwise.
/// An invalid pattern falls back to [`DEFAULT_TIME_FORMAT`].
pub fn format_timestamp(now: DateTime<Utc>, format: &TimeFormat, timezone: Option<&str>) -> String {
    match format {
        TimeFormat::Timestamp => now.timestamp_millis().to_string(),
        TimeFormat::Iso => now.to_rfc3339_opts(SecondsFormat::Millis, true),
        TimeFormat::Gmt => now.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        TimeFormat::Utc => now.to_rfc3339_opts(SecondsFormat::Secs, true),
        TimeFormat::Pattern(pattern) => {
            let pattern = if is_valid_pattern(pattern) {
                pattern.as_str()
            } else {
                DEFAULT_TIME_FORMAT
            };
            match timezone.and_then(resolve_timezone) {
                Some(Zone::Fixed(offset)) => now.with_timezone(&offset).format(pattern).to_string(),
                Some(Zone::Named(tz)) => now.with_timezone(&tz).format(pattern).to_string(),
                None => now.with_timezone(&Local).format(pattern).to_string(),
            }
        }
    }
}
