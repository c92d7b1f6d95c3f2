//! Time-range parsing and interval math.
//!
//! Callers supply start/end times as relative expressions (`now`, `now-1h`),
//! RFC 3339 timestamps, date-only strings, or Unix second/millisecond
//! timestamps. Everything is normalized to UTC instants before macro
//! expansion. Date-only *end* times resolve to the end of that day so that
//! `end="2026-08-28"` covers the whole day rather than its first instant.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::core::{QueryError, Result};

/// A resolved `[start, end)` instant pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive start of the window
    pub start: DateTime<Utc>,
    /// Exclusive end of the window
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Parse a start/end pair relative to the current wall clock.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::parse_at(start, end, Utc::now())
    }

    /// Parse a start/end pair relative to an explicit `now`, for
    /// deterministic evaluation of relative expressions.
    pub fn parse_at(start: &str, end: &str, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            start: parse_start(start, now)?,
            end: parse_end(end, now)?,
        })
    }

    /// Total width of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Start instant as Unix seconds.
    pub fn start_epoch_seconds(&self) -> i64 {
        self.start.timestamp()
    }

    /// End instant as Unix seconds.
    pub fn end_epoch_seconds(&self) -> i64 {
        self.end.timestamp()
    }

    /// Start instant as Unix milliseconds.
    pub fn start_epoch_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// End instant as Unix milliseconds.
    pub fn end_epoch_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Parse a start-time string. Date-only strings resolve to the start of day.
pub fn parse_start(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_instant(input, now, false)
}

/// Parse an end-time string. Date-only strings resolve to the end of day.
pub fn parse_end(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_instant(input, now, true)
}

fn parse_instant(input: &str, now: DateTime<Utc>, end_of_day: bool) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QueryError::InvalidTimeRange {
            input: input.to_string(),
            reason: "empty time string".to_string(),
        });
    }

    if let Some(relative) = parse_relative(trimmed, now) {
        return relative;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let time = if end_of_day {
            date.and_hms_milli_opt(23, 59, 59, 999)
        } else {
            date.and_hms_opt(0, 0, 0)
        };
        // both constructions are valid for every calendar date
        if let Some(naive) = time {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(epoch) = trimmed.parse::<i64>() {
        // 13+ digit values are Unix milliseconds, shorter ones seconds
        let millis = if epoch.unsigned_abs() >= 1_000_000_000_000 {
            epoch
        } else {
            epoch.saturating_mul(1000)
        };
        return DateTime::from_timestamp_millis(millis).ok_or_else(|| QueryError::InvalidTimeRange {
            input: input.to_string(),
            reason: "timestamp out of range".to_string(),
        });
    }

    Err(QueryError::InvalidTimeRange {
        input: input.to_string(),
        reason: "expected 'now', 'now-<N><s|m|h|d|w>', RFC 3339, YYYY-MM-DD, or a Unix timestamp"
            .to_string(),
    })
}

/// Handle `now` and `now±<N><unit>` expressions. Returns `None` for inputs
/// that are not relative at all.
fn parse_relative(input: &str, now: DateTime<Utc>) -> Option<Result<DateTime<Utc>>> {
    let rest = input.strip_prefix("now")?;
    if rest.is_empty() {
        return Some(Ok(now));
    }

    let invalid = || QueryError::InvalidTimeRange {
        input: input.to_string(),
        reason: "expected 'now' offset like 'now-30m' or 'now-1h'".to_string(),
    };

    let (sign, offset) = match rest.as_bytes()[0] {
        b'-' => (-1, &rest[1..]),
        b'+' => (1, &rest[1..]),
        _ => return Some(Err(invalid())),
    };
    if offset.len() < 2 {
        return Some(Err(invalid()));
    }

    // split on the unit's char boundary; the suffix may be any UTF-8 char
    let Some(unit) = offset.chars().last() else {
        return Some(Err(invalid()));
    };
    let digits = &offset[..offset.len() - unit.len_utf8()];
    let amount: i64 = match digits.parse() {
        Ok(n) => n,
        Err(_) => return Some(Err(invalid())),
    };
    let step = match unit {
        's' => Duration::seconds(amount),
        'm' => Duration::minutes(amount),
        'h' => Duration::hours(amount),
        'd' => Duration::days(amount),
        'w' => Duration::weeks(amount),
        _ => return Some(Err(invalid())),
    };

    Some(Ok(if sign < 0 { now - step } else { now + step }))
}
