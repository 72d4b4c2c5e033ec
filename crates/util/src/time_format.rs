//! # Time Formatting Utilities
//!
//! Human-readable durations (`1337` ms → `1.3s`), parsing of duration
//! strings (`"1.5h"`), relative timestamps (`3 minutes ago`) and calendar
//! date formatting.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

const SECOND: f64 = 1000.0;
const MINUTE: f64 = SECOND * 60.0;
const HOUR: f64 = MINUTE * 60.0;
const DAY: f64 = HOUR * 24.0;
const WEEK: f64 = DAY * 7.0;
const YEAR: f64 = DAY * 365.25;

/// Longest input accepted by [`parse_duration`].
const MAX_DURATION_INPUT: usize = 100;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DurationError {
    #[error("duration must be a finite number, got {0}")]
    NotFinite(f64),
    #[error("duration text is {0} characters long; at most 100 are accepted")]
    TooLong(usize),
    #[error("`{0}` is not a duration")]
    Invalid(String),
}

/// Options for [`format_ms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsOptions {
    /// Only the largest unit, without decimals (`1h`).
    pub compact: bool,
    /// Full unit names (`5 hours`).
    pub verbose: bool,
    /// Keep at most this many units, largest first.
    pub unit_count: Option<usize>,
    pub seconds_decimal_digits: usize,
    pub milliseconds_decimal_digits: usize,
    /// Render `1000` as `1.0s` instead of `1s`.
    pub keep_decimals_on_whole_seconds: bool,
    /// Show milliseconds as their own unit instead of a seconds fraction.
    pub separate_milliseconds: bool,
    /// Show microseconds and nanoseconds as well.
    pub format_sub_milliseconds: bool,
    /// Digital-clock style, `5h 1m 45s` becomes `5:01:45`.
    pub colon_notation: bool,
}

impl Default for MsOptions {
    fn default() -> Self {
        Self {
            compact: false,
            verbose: false,
            unit_count: None,
            seconds_decimal_digits: 1,
            milliseconds_decimal_digits: 0,
            keep_decimals_on_whole_seconds: false,
            separate_milliseconds: false,
            format_sub_milliseconds: false,
            colon_notation: false,
        }
    }
}

/// Formats a duration in milliseconds for humans.
///
/// # Arguments
/// * `milliseconds` - The duration; negative values get a `-` prefix
/// * `options` - Rendering switches
///
/// # Returns
/// The formatted duration, or an error for NaN and infinite input
///
/// # Example
/// ```rust
/// use knit_util::time_format::{MsOptions, format_ms};
///
/// let options = MsOptions::default();
/// assert_eq!(format_ms(1337.0, &options).unwrap(), "1.3s");
/// assert_eq!(format_ms(133.0, &options).unwrap(), "133ms");
/// assert_eq!(format_ms(1_337_000_000.0, &options).unwrap(), "15d 11h 23m 20s");
/// ```
pub fn format_ms(milliseconds: f64, options: &MsOptions) -> Result<String, DurationError> {
    if !milliseconds.is_finite() {
        return Err(DurationError::NotFinite(milliseconds));
    }

    let mut options = options.clone();
    if options.colon_notation {
        options.compact = false;
        options.format_sub_milliseconds = false;
        options.separate_milliseconds = false;
        options.verbose = false;
    }
    if options.compact {
        options.unit_count = Some(1);
        options.seconds_decimal_digits = 0;
        options.milliseconds_decimal_digits = 0;
    }

    let sign = if milliseconds < 0.0 { "-" } else { "" };
    let milliseconds = milliseconds.abs();
    let mut units = UnitList::new(&options);

    let days = (milliseconds / DAY).trunc();
    units.add((days / 365.0).trunc(), None, "year", "y");
    units.add(days % 365.0, None, "day", "d");
    units.add((milliseconds / HOUR).trunc() % 24.0, None, "hour", "h");
    units.add((milliseconds / MINUTE).trunc() % 60.0, None, "minute", "m");

    let split_sub_second = options.separate_milliseconds
        || options.format_sub_milliseconds
        || (!options.colon_notation && milliseconds < SECOND);

    if split_sub_second {
        units.add((milliseconds / SECOND).trunc() % 60.0, None, "second", "s");

        let whole = milliseconds.trunc() % 1000.0;
        let micro = (milliseconds * 1e3).trunc() % 1000.0;
        let nano = (milliseconds * 1e6).trunc() % 1000.0;

        if options.format_sub_milliseconds {
            units.add(whole, None, "millisecond", "ms");
            units.add(micro, None, "microsecond", "µs");
            units.add(nano, None, "nanosecond", "ns");
        } else {
            let below = whole + micro / 1e3 + nano / 1e6;
            let text = if options.milliseconds_decimal_digits > 0 {
                format!("{:.*}", options.milliseconds_decimal_digits, below)
            } else if below >= 1.0 {
                below.round().to_string()
            } else {
                below.ceil().to_string()
            };
            let value = text.parse().unwrap_or(0.0);
            units.add(value, Some(text), "millisecond", "ms");
        }
    } else {
        let seconds = (milliseconds / SECOND) % 60.0;
        let fixed = floor_decimals(seconds, options.seconds_decimal_digits);
        let text = if options.keep_decimals_on_whole_seconds {
            fixed
        } else {
            strip_zero_decimals(&fixed).to_string()
        };
        let value = text.parse().unwrap_or(0.0);
        units.add(value, Some(text), "second", "s");
    }

    if units.items.is_empty() {
        let zero = if options.verbose { "0 milliseconds" } else { "0ms" };
        return Ok(format!("{}{}", sign, zero));
    }

    let mut items = units.items;
    if let Some(count) = options.unit_count {
        items.truncate(count.max(1));
    }
    let separator = if options.colon_notation { ":" } else { " " };
    Ok(format!("{}{}", sign, items.join(separator)))
}

/// Accumulates rendered units, skipping leading zeros.
struct UnitList {
    colon_notation: bool,
    verbose: bool,
    items: Vec<String>,
}

impl UnitList {
    fn new(options: &MsOptions) -> Self {
        Self {
            colon_notation: options.colon_notation,
            verbose: options.verbose,
            items: Vec::new(),
        }
    }

    fn add(&mut self, value: f64, text: Option<String>, long: &str, short: &str) {
        let skippable = self.items.is_empty() || !self.colon_notation;
        if skippable && value == 0.0 && !(self.colon_notation && short == "m") {
            return;
        }

        let mut text = text.unwrap_or_else(|| value.to_string());
        if self.colon_notation {
            let whole_digits = text.split('.').next().map_or(0, str::len);
            let min_digits: usize = if self.items.is_empty() { 1 } else { 2 };
            text = format!("{}{}", "0".repeat(min_digits.saturating_sub(whole_digits)), text);
        } else if self.verbose {
            let plural = if value == 1.0 { "" } else { "s" };
            text = format!("{} {}{}", text, long, plural);
        } else {
            text.push_str(short);
        }
        self.items.push(text);
    }
}

fn floor_decimals(value: f64, digits: usize) -> String {
    let factor = 10f64.powi(digits as i32);
    let floored = (value * factor + 1e-7).floor();
    format!("{:.*}", digits, floored.round() / factor)
}

fn strip_zero_decimals(fixed: &str) -> &str {
    match fixed.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|digit| digit == '0') => whole,
        _ => fixed,
    }
}

/// Single-unit short form: `60000` → `1m`, `500` → `500ms`.
pub fn format_ms_short(milliseconds: f64) -> Result<String, DurationError> {
    if !milliseconds.is_finite() {
        return Err(DurationError::NotFinite(milliseconds));
    }
    let magnitude = milliseconds.abs();
    for (unit, suffix) in [(DAY, "d"), (HOUR, "h"), (MINUTE, "m"), (SECOND, "s")] {
        if magnitude >= unit {
            return Ok(format!("{}{}", round_half_up(milliseconds / unit), suffix));
        }
    }
    Ok(format!("{}ms", milliseconds))
}

/// Single-unit long form: `60000` → `1 minute`, `5400000` → `2 hours`.
pub fn format_ms_long(milliseconds: f64) -> Result<String, DurationError> {
    if !milliseconds.is_finite() {
        return Err(DurationError::NotFinite(milliseconds));
    }
    let magnitude = milliseconds.abs();
    for (unit, name) in [(DAY, "day"), (HOUR, "hour"), (MINUTE, "minute"), (SECOND, "second")] {
        if magnitude >= unit {
            let plural = if magnitude >= unit * 1.5 { "s" } else { "" };
            return Ok(format!("{} {}{}", round_half_up(milliseconds / unit), name, plural));
        }
    }
    Ok(format!("{} ms", milliseconds))
}

fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Parses a duration such as `"2 days"`, `"1.5h"` or `"-3s"` into
/// milliseconds. A bare number is taken as milliseconds.
///
/// # Arguments
/// * `text` - At most 100 characters
///
/// # Returns
/// The duration in milliseconds
pub fn parse_duration(text: &str) -> Result<f64, DurationError> {
    static DURATION: Lazy<Regex> = Lazy::new(|| {
        Regex::new(concat!(
            r"(?i)^(-?(?:\d+)?\.?\d+) *",
            r"(milliseconds?|msecs?|ms|seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h",
            r"|days?|d|weeks?|w|years?|yrs?|y)?$",
        ))
        .unwrap()
    });

    if text.len() > MAX_DURATION_INPUT {
        return Err(DurationError::TooLong(text.len()));
    }

    let captures = DURATION
        .captures(text)
        .ok_or_else(|| DurationError::Invalid(text.to_string()))?;
    let value: f64 = captures[1]
        .parse()
        .map_err(|_| DurationError::Invalid(text.to_string()))?;
    let unit = captures
        .get(2)
        .map(|unit| unit.as_str().to_ascii_lowercase())
        .unwrap_or_default();

    let factor = match unit.as_str() {
        "years" | "year" | "yrs" | "yr" | "y" => YEAR,
        "weeks" | "week" | "w" => WEEK,
        "days" | "day" | "d" => DAY,
        "hours" | "hour" | "hrs" | "hr" | "h" => HOUR,
        "minutes" | "minute" | "mins" | "min" | "m" => MINUTE,
        "seconds" | "second" | "secs" | "sec" | "s" => SECOND,
        _ => 1.0,
    };
    Ok(value * factor)
}

/// Describes `then` relative to `now`: `just now`, `3 minutes ago`,
/// `in 2 hours`, `a year ago`.
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then);
    let seconds = delta.num_seconds().unsigned_abs() as f64;

    if seconds < 45.0 {
        return "just now".to_string();
    }

    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    let phrase = if seconds < 90.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", minutes.round())
    } else if minutes < 90.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", hours.round())
    } else if hours < 36.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", days.round())
    } else if days < 45.0 {
        "a month".to_string()
    } else if days < 320.0 {
        format!("{} months", (days / 30.4).round().max(2.0))
    } else if days < 548.0 {
        "a year".to_string()
    } else {
        format!("{} years", (days / 365.0).round().max(2.0))
    };

    if delta.num_seconds() >= 0 {
        format!("{} ago", phrase)
    } else {
        format!("in {}", phrase)
    }
}

/// Formats common date strings into MM/DD/YYYY if parsable.
///
/// Supports RFC3339 timestamps and the `YYYY-MM-DD` and `YYYY/MM/DD` forms.
///
/// # Arguments
/// * `date_string` - The date string to format
///
/// # Returns
/// Some formatted date string if parsing succeeds, None otherwise
///
/// # Example
/// ```rust
/// use knit_util::time_format::format_date_mmddyyyy;
///
/// assert_eq!(format_date_mmddyyyy("2023-12-25T10:30:00Z"), Some("12/25/2023".to_string()));
/// assert_eq!(format_date_mmddyyyy("2023/06/15"), Some("06/15/2023".to_string()));
/// assert_eq!(format_date_mmddyyyy("2023-13-45"), None);
/// ```
pub fn format_date_mmddyyyy(date_string: &str) -> Option<String> {
    let date = DateTime::parse_from_rfc3339(date_string)
        .map(|date_time| date_time.date_naive())
        .ok()
        .or_else(|| {
            ["%Y-%m-%d", "%Y/%m/%d"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(date_string, format).ok())
        })?;
    Some(format!("{:02}/{:02}/{}", date.month(), date.day(), date.year()))
}
