//! Temporal macro expansion, per backend dialect.
//!
//! Grafana-style dashboards embed time-window macros in their queries. Each
//! backend family speaks its own dialect:
//!
//! - the **duration dialect** ([`expand_metrics_macros`]) used by metrics
//!   queries: `$__range`, `$__rate_interval`, `$__interval`, plus raw
//!   integer forms (`$__range_s`, `$__range_ms`, `$__interval_ms`);
//! - the **epoch dialect** ([`expand_sql_macros`]) used by tabular SQL
//!   queries: `$__timeFilter(column)`, `$__from`/`$__to` millisecond
//!   epochs, and a seconds-style `$__interval`.
//!
//! Substitution order matters twice over: `$__range_s`/`$__range_ms` must go
//! before `$__range`, and `$__interval_ms` before `$__interval`, or the bare
//! replacement corrupts the suffixed token into e.g. `36s_ms`.

use std::sync::LazyLock;

use chrono::Duration;
use regex::Regex;

use crate::timerange::TimeRange;

/// `$__timeFilter(column)`; the column may be a bare, dotted, quoted, or
/// backtick-quoted identifier; surrounding whitespace is trimmed.
static TIME_FILTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$__timeFilter\(([^)]*)\)").unwrap());

/// Default value for `$__rate_interval`.
const RATE_INTERVAL: &str = "1m";

/// Expand the duration-dialect macros for a metrics query.
pub fn expand_metrics_macros(query: &str, range: &TimeRange) -> String {
    let total = range.duration();
    let total_ms = total.num_milliseconds();

    // raw integer range forms first, before $__range can eat their prefix
    let mut q = query
        .replace("${__range_ms}", &total_ms.to_string())
        .replace("$__range_ms", &total_ms.to_string())
        .replace("${__range_s}", &total.num_seconds().to_string())
        .replace("$__range_s", &total.num_seconds().to_string());

    let range_str = format_duration(total);
    q = q.replace("${__range}", &range_str).replace("$__range", &range_str);

    q = q
        .replace("${__rate_interval}", RATE_INTERVAL)
        .replace("$__rate_interval", RATE_INTERVAL);

    // interval targets ~100 data points across the range, floored to 1s
    let interval = interval_for(total, 100);
    let interval_ms = interval.num_milliseconds().to_string();
    q = q.replace("${__interval_ms}", &interval_ms).replace("$__interval_ms", &interval_ms);

    let interval_str = format_duration(interval);
    q.replace("${__interval}", &interval_str).replace("$__interval", &interval_str)
}

/// Expand the epoch-dialect macros for a tabular SQL query.
pub fn expand_sql_macros(query: &str, range: &TimeRange) -> String {
    let start_s = range.start_epoch_seconds();
    let end_s = range.end_epoch_seconds();

    let mut q = TIME_FILTER_RE
        .replace_all(query, |caps: &regex::Captures<'_>| {
            let column = caps[1].trim();
            format!("{column} >= toDateTime({start_s}) AND {column} <= toDateTime({end_s})")
        })
        .into_owned();

    let from_ms = range.start_epoch_millis().to_string();
    let to_ms = range.end_epoch_millis().to_string();
    q = q
        .replace("${__from}", &from_ms)
        .replace("$__from", &from_ms)
        .replace("${__to}", &to_ms)
        .replace("$__to", &to_ms);

    // SQL interval targets ~1000 points, floored to 1s, always in seconds
    let interval = interval_for(range.duration(), 1000);
    let interval_ms = interval.num_milliseconds().to_string();
    q = q.replace("${__interval_ms}", &interval_ms).replace("$__interval_ms", &interval_ms);

    let interval_str = format!("{}s", interval.num_seconds());
    q.replace("${__interval}", &interval_str).replace("$__interval", &interval_str)
}

/// Interval as 1/`divisor` of the total range, floored to one second.
fn interval_for(total: Duration, divisor: i64) -> Duration {
    let interval = Duration::milliseconds(total.num_milliseconds() / divisor);
    if interval < Duration::seconds(1) { Duration::seconds(1) } else { interval }
}

/// Format a duration the way range selectors expect: `45s`, `14m`, `1h`,
/// `1h30m`. Sub-minute durations are whole seconds, sub-hour durations
/// whole minutes; above an hour the minutes suffix is dropped when zero.
pub fn format_duration(d: Duration) -> String {
    if d < Duration::minutes(1) {
        return format!("{}s", d.num_seconds());
    }
    if d < Duration::hours(1) {
        return format!("{}m", d.num_minutes());
    }
    let hours = d.num_hours();
    let minutes = d.num_minutes() % 60;
    if minutes == 0 { format!("{hours}h") } else { format!("{hours}h{minutes}m") }
}
