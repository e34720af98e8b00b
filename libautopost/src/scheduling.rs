//! Parsing of publish times given on the command line
//!
//! Accepted forms, tried in this order:
//! - `now`
//! - `@<unix seconds>`
//! - RFC 3339: `2025-11-20T15:00:00Z`, `2025-11-20T15:00:00+02:00`
//! - `YYYY-MM-DD HH:MM` or `YYYY-MM-DD HH:MM:SS`, read as UTC
//! - durations from now: `30m`, `2h 30m`, `in 1d`
//! - natural language: `tomorrow 9am`, `next monday 10:00`

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

use crate::error::{AutopostError, Result};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"];

pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    parse_schedule_at(input, Utc::now())
}

/// Parse `input` relative to `now`
pub fn parse_schedule_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AutopostError::InvalidInput(
            "Schedule time cannot be empty".to_string(),
        ));
    }

    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(secs) = input.strip_prefix('@') {
        return secs
            .parse::<i64>()
            .ok()
            .and_then(|s| DateTime::from_timestamp(s, 0))
            .ok_or_else(|| AutopostError::InvalidInput(format!("Invalid unix timestamp: {}", input)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Some(duration) = parse_offset(input) {
        return now
            .checked_add_signed(duration)
            .ok_or_else(|| AutopostError::InvalidInput("Duration out of range".to_string()));
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|e| {
        AutopostError::InvalidInput(format!("Could not parse time '{}': {}", input, e))
    })
}

/// `2h`, `in 2h`, `90 minutes`
fn parse_offset(input: &str) -> Option<Duration> {
    let input = input.strip_prefix("in ").unwrap_or(input).trim();
    let std_duration = humantime::parse_duration(input).ok()?;
    Duration::from_std(std_duration).ok()
}

/// Render a stored timestamp for humans, `-` when unset
pub fn format_timestamp(ts: Option<i64>) -> String {
    ts.and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}
