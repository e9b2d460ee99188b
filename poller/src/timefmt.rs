use crate::errors::{Error, Result};
use chrono::{DateTime, FixedOffset, Local, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Operator-facing time format: day-month-year, 24-hour clock.
pub const TIME_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Zone in which operator-supplied wall-clock times are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    pub fn utc() -> Self {
        Zone::Fixed(Utc.fix())
    }
}

impl FromStr for Zone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" | "Local" => return Ok(Zone::Local),
            "utc" | "UTC" | "Z" => return Ok(Zone::utc()),
            _ => {}
        }

        let invalid = || Error::Config(format!("Invalid time zone {s:?}, expected local, utc or +HH:MM"));

        let (sign, rest) = match s.as_bytes().first() {
            Some(b'+') => (1, &s[1..]),
            Some(b'-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        if !is_digits(hours) || !is_digits(minutes) {
            return Err(invalid());
        }
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if !(0..60).contains(&minutes) {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Zone::Fixed)
            .ok_or_else(invalid)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => f.write_str("local"),
            Zone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Converts `DD-MM-YYYY HH:MM:SS` in `zone` to epoch milliseconds.
///
/// Fields may be unpadded (`2-2-2025 0:0:0`) except the year, which must be
/// exactly four digits. Impossible calendar dates and
/// wall-clock times skipped by a DST transition are rejected; times repeated
/// by a transition resolve to the earlier instant.
pub fn to_epoch_ms(text: &str, zone: Zone) -> Result<i64> {
    let invalid = || Error::InvalidTimeFormat(text.to_string());

    if !has_four_digit_year(text) {
        return Err(invalid());
    }
    let naive = NaiveDateTime::parse_from_str(text, TIME_FORMAT).map_err(|_| invalid())?;

    let millis = match zone {
        Zone::Local => earliest(Local.from_local_datetime(&naive))
            .ok_or_else(invalid)?
            .timestamp_millis(),
        Zone::Fixed(offset) => earliest(offset.from_local_datetime(&naive))
            .ok_or_else(invalid)?
            .timestamp_millis(),
    };

    Ok(millis)
}

/// Formats epoch milliseconds back into the operator format.
pub fn from_epoch_ms(millis: i64, zone: Zone) -> Option<String> {
    let utc = Utc.timestamp_millis_opt(millis).single()?;
    let text = match zone {
        Zone::Local => utc.with_timezone(&Local).format(TIME_FORMAT).to_string(),
        Zone::Fixed(offset) => utc.with_timezone(&offset).format(TIME_FORMAT).to_string(),
    };
    Some(text)
}

// `%Y` alone takes any digit count and a sign.
fn has_four_digit_year(text: &str) -> bool {
    text.split(' ')
        .next()
        .and_then(|date| date.splitn(3, '-').nth(2))
        .is_some_and(|year| year.len() == 4 && is_digits(year))
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn earliest<Tz: TimeZone>(result: LocalResult<DateTime<Tz>>) -> Option<DateTime<Tz>> {
    result.earliest()
}

/// One end of a telemetry time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeBound {
    Millis(i64),
    Text(String),
}

impl TimeBound {
    pub fn to_millis(&self, zone: Zone) -> Result<i64> {
        match self {
            TimeBound::Millis(ms) => Ok(*ms),
            TimeBound::Text(text) => to_epoch_ms(text, zone),
        }
    }
}

impl FromStr for TimeBound {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(ms) => TimeBound::Millis(ms),
            Err(_) => TimeBound::Text(s.to_string()),
        })
    }
}

impl From<i64> for TimeBound {
    fn from(ms: i64) -> Self {
        TimeBound::Millis(ms)
    }
}

impl From<&str> for TimeBound {
    fn from(text: &str) -> Self {
        TimeBound::Text(text.to_string())
    }
}

impl From<String> for TimeBound {
    fn from(text: String) -> Self {
        TimeBound::Text(text)
    }
}

impl fmt::Display for TimeBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBound::Millis(ms) => write!(f, "{ms}"),
            TimeBound::Text(text) => f.write_str(text),
        }
    }
}
