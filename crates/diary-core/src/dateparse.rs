//! Timestamp parsing.
//!
//! Stores exchange timestamps as ISO 8601 strings in local time. The remote
//! API adds a `Z` suffix and fractional seconds, which carry no information
//! we use and are stripped before parsing.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a store timestamp into a naive local datetime.
///
/// Accepts:
/// - "2024-01-28 12:00:00" and "2024-01-28T12:00:00"
/// - either of the above with a trailing "Z" and/or fractional seconds
/// - a bare date, "2024-01-28", taken as midnight
pub fn parse_timestamp(input: &str) -> Result<NaiveDateTime, Error> {
    let trimmed = input.trim();
    let without_zone = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
        .unwrap_or(trimmed);
    let normalized = strip_fraction(without_zone).replacen(|c: char| c == 'T' || c == 't', " ", 1);

    if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, TIMESTAMP_FORMAT) {
        return Ok(dt);
    }

    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return Ok(start_of_day(date));
    }

    Err(Error::Format(input.to_string()))
}

/// Format a datetime the way the local stores persist it.
pub fn format_timestamp(dt: NaiveDateTime) -> String {
    dt.format(TIMESTAMP_FORMAT).to_string()
}

/// Drop a ".123456" fractional-seconds part following the time.
fn strip_fraction(input: &str) -> &str {
    match input.rfind('.') {
        Some(pos) if pos > 0 && input[pos + 1..].chars().all(|c| c.is_ascii_digit()) => {
            &input[..pos]
        }
        _ => input,
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

/// Parse a human-readable date relative to `now`.
///
/// Supports:
/// - everything [`parse_timestamp`] accepts
/// - Relative past: "2 days ago", "1 week ago", "3 hours ago"
/// - Relative future: "in 2 days", "in 1 week"
/// - Named: "today", "yesterday", "tomorrow", "now"
///
/// Returns None if the string cannot be parsed.
pub fn parse_human_date(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let input = input.trim().to_lowercase();

    if let Ok(dt) = parse_timestamp(&input) {
        return Some(dt);
    }

    match input.as_str() {
        "now" => return Some(now),
        "today" => return Some(start_of_day(now.date())),
        "yesterday" => return start_of_day(now.date()).checked_sub_signed(Duration::days(1)),
        "tomorrow" => return start_of_day(now.date()).checked_add_signed(Duration::days(1)),
        _ => {}
    }

    if let Some(duration) = parse_ago(&input) {
        return now.checked_sub_signed(duration);
    }

    if let Some(duration) = parse_in_future(&input) {
        return now.checked_add_signed(duration);
    }

    None
}

/// Parse "X unit(s) ago" pattern
fn parse_ago(input: &str) -> Option<Duration> {
    let without_ago = input.trim().strip_suffix(" ago")?;
    parse_duration(without_ago)
}

/// Parse "in X unit(s)" pattern
fn parse_in_future(input: &str) -> Option<Duration> {
    let without_in = input.trim().strip_prefix("in ")?;
    parse_duration(without_in)
}

/// Parse a duration like "2 days", "1 week", "3hours"
fn parse_duration(input: &str) -> Option<Duration> {
    let parts: Vec<&str> = input.split_whitespace().collect();

    match parts.as_slice() {
        [num, unit] => unit_to_duration(unit, num.parse().ok()?),
        [word] => {
            let num_end = word.chars().take_while(|c| c.is_ascii_digit()).count();
            if num_end == 0 || num_end == word.len() {
                return None;
            }
            unit_to_duration(&word[num_end..], word[..num_end].parse().ok()?)
        }
        _ => None,
    }
}

fn unit_to_duration(unit: &str, num: i64) -> Option<Duration> {
    let unit = unit.trim_end_matches('s');
    match unit {
        "second" | "sec" => Duration::try_seconds(num),
        "minute" | "min" => Duration::try_minutes(num),
        "hour" | "hr" | "h" => Duration::try_hours(num),
        "day" | "d" => Duration::try_days(num),
        "week" | "wk" | "w" => Duration::try_weeks(num),
        "month" | "mon" => Duration::try_days(num.checked_mul(30)?), // Approximate
        "year" | "yr" | "y" => Duration::try_days(num.checked_mul(365)?), // Approximate
        _ => None,
    }
}
