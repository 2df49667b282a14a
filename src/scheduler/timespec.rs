// src/scheduler/timespec.rs - Human time expressions <-> seconds
//!
//! Accepted forms, first match wins:
//!
//! - bare seconds: `"145"`, `"2.5"`
//! - positional `d:h:m:s`, right aligned, empty fields count as zero:
//!   `"::30"`, `"02:30"`, `"1.5:::"`
//! - unit tokens with optional magnitude: `"2day 2h"`, `"1.5day 2.5h"`, `"min"`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const SECS_PER_MINUTE: f64 = 60.0;
pub const SECS_PER_HOUR: f64 = 3600.0;
pub const SECS_PER_DAY: f64 = 86400.0;

/// Digits kept for fractional seconds when formatting.
const FRACTION_DIGITS: i32 = 6;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimeSpecError {
    #[error("No time string provided")]
    MissingTime,
    #[error("No temperature gradient given")]
    MissingGradient,
    #[error("Only non-negative seconds allowed, got {0}")]
    Negative(f64),
    #[error("Unsupported time expression '{0}'")]
    Syntax(String),
    #[error("Unsupported temperature '{0}'")]
    InvalidTemperature(String),
    #[error("Time of {0} secs is out of range")]
    OutOfRange(f64),
}

/// A duration normalized to seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(try_from = "RawTime", into = "f64")]
pub struct TimeSpec(f64);

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec(0.0);

    /// Parse an optional expression; `None` is a missing-argument error.
    pub fn parse(input: Option<&str>) -> Result<Self, TimeSpecError> {
        let input = input.ok_or(TimeSpecError::MissingTime)?;
        TimeSpec::from_secs(parse_seconds(input)?)
    }

    /// Accepts any non-negative count of seconds a `Duration` can hold.
    pub fn from_secs(secs: f64) -> Result<Self, TimeSpecError> {
        if secs.is_nan() || secs < 0.0 {
            return Err(TimeSpecError::Negative(secs));
        }
        if Duration::try_from_secs_f64(secs).is_err() {
            return Err(TimeSpecError::OutOfRange(secs));
        }
        Ok(TimeSpec(secs))
    }

    pub fn as_secs(&self) -> f64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        // range checked in from_secs
        Duration::try_from_secs_f64(self.0).unwrap_or(Duration::MAX)
    }
}

impl FromStr for TimeSpec {
    type Err = TimeSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeSpec::parse(Some(s))
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match format_seconds(self.0, None) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}s", self.0),
        }
    }
}

impl From<TimeSpec> for f64 {
    fn from(t: TimeSpec) -> f64 {
        t.0
    }
}

/// TOML accepts either `rise_time = 300` or `rise_time = "5min"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawTime {
    Secs(f64),
    Text(String),
}

impl TryFrom<RawTime> for TimeSpec {
    type Error = TimeSpecError;

    fn try_from(raw: RawTime) -> Result<Self, Self::Error> {
        match raw {
            RawTime::Secs(secs) => TimeSpec::from_secs(secs),
            RawTime::Text(text) => text.parse(),
        }
    }
}

/// Convert a time expression into seconds.
pub fn parse_seconds(input: &str) -> Result<f64, TimeSpecError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeSpecError::Syntax(input.to_string()));
    }
    if is_decimal(trimmed) {
        return parse_decimal(trimmed, input);
    }
    if trimmed.contains(':') {
        return parse_positional(trimmed, input);
    }
    parse_units(trimmed, input)
}

fn is_decimal(s: &str) -> bool {
    let mut dots = 0;
    let mut digits = 0;
    for c in s.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1
}

fn parse_decimal(s: &str, original: &str) -> Result<f64, TimeSpecError> {
    s.parse::<f64>()
        .map_err(|_| TimeSpecError::Syntax(original.to_string()))
}

// d:h:m:s, aligned from the right
fn parse_positional(s: &str, original: &str) -> Result<f64, TimeSpecError> {
    const SCALES: [f64; 4] = [1.0, SECS_PER_MINUTE, SECS_PER_HOUR, SECS_PER_DAY];

    let fields: Vec<&str> = s.split(':').collect();
    if fields.len() > SCALES.len() {
        return Err(TimeSpecError::Syntax(original.to_string()));
    }
    let mut total = 0.0;
    for (field, scale) in fields.iter().rev().zip(SCALES.iter()) {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        if !is_decimal(field) {
            return Err(TimeSpecError::Syntax(original.to_string()));
        }
        total += parse_decimal(field, original)? * scale;
    }
    Ok(total)
}

fn unit_scale(unit: &str) -> Option<f64> {
    match unit.to_ascii_lowercase().as_str() {
        "d" | "day" | "days" => Some(SECS_PER_DAY),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(SECS_PER_HOUR),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(SECS_PER_MINUTE),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0),
        _ => None,
    }
}

// sequence of [number] unit, magnitude defaults to 1
fn parse_units(s: &str, original: &str) -> Result<f64, TimeSpecError> {
    let syntax = || TimeSpecError::Syntax(original.to_string());
    let bytes = s.as_bytes();
    let len = bytes.len();
    let mut pos = 0;
    let mut total = 0.0;
    let mut tokens = 0;

    while pos < len {
        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= len {
            break;
        }

        let num_start = pos;
        while pos < len && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
            pos += 1;
        }
        let magnitude = if pos > num_start {
            let number = &s[num_start..pos];
            if !is_decimal(number) {
                return Err(syntax());
            }
            parse_decimal(number, original)?
        } else {
            1.0
        };

        while pos < len && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        let unit_start = pos;
        while pos < len && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == unit_start {
            // number without a unit
            return Err(syntax());
        }
        let scale = unit_scale(&s[unit_start..pos]).ok_or_else(syntax)?;
        total += magnitude * scale;
        tokens += 1;
    }

    if tokens == 0 {
        return Err(syntax());
    }
    Ok(total)
}

/// Format seconds for humans.
///
/// Without a separator the result lists only non-zero units (`"1d 12h 31s"`).
/// With a separator it is the fixed four field form `d<sep>h<sep>m<sep>s`.
/// Zero is always `"0"`.
pub fn format_seconds(secs: f64, separator: Option<&str>) -> Result<String, TimeSpecError> {
    if secs.is_nan() || secs < 0.0 {
        return Err(TimeSpecError::Negative(secs));
    }
    if secs == 0.0 {
        return Ok("0".to_string());
    }

    let days = (secs / SECS_PER_DAY).floor();
    let mut rest = secs - days * SECS_PER_DAY;
    let hours = (rest / SECS_PER_HOUR).floor();
    rest -= hours * SECS_PER_HOUR;
    let minutes = (rest / SECS_PER_MINUTE).floor();
    rest -= minutes * SECS_PER_MINUTE;
    let scale = 10f64.powi(FRACTION_DIGITS);
    let seconds = (rest * scale).round() / scale;

    if let Some(sep) = separator {
        return Ok([days, hours, minutes, seconds]
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(sep));
    }

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m"), (seconds, "s")]
        .iter()
        .filter(|(value, _)| *value != 0.0)
        .map(|(value, unit)| format!("{}{}", value, unit))
        .collect();
    if parts.is_empty() {
        // only sub-microsecond remainder
        return Ok("0".to_string());
    }
    Ok(parts.join(" "))
}

/// Parse a temperature such as `"5C"`, `"10c"` or `"-2.5"` into degrees Celsius.
pub fn parse_temperature(input: &str) -> Result<f64, TimeSpecError> {
    let invalid = || TimeSpecError::InvalidTemperature(input.to_string());
    let trimmed = input.trim();
    let number = trimmed
        .strip_suffix(['C', 'c'])
        .map(str::trim_end)
        .unwrap_or(trimmed);
    if number.is_empty() {
        return Err(invalid());
    }
    let value: f64 = number.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}
