//! Time formatting utilities.

use chrono::{DateTime, TimeDelta, Utc};

/// Shown when no transition has ever finished.
pub const NEVER_MOVED: &str = "eternity and/or never";

fn plural(n: i64, unit: &str) -> String {
    format!("{n} {unit}{}", if n == 1 { "" } else { "s" })
}

/// Format a span as its two most significant units, e.g. `3 days, 4 hours`.
#[must_use]
pub fn format_elapsed(elapsed: TimeDelta) -> String {
    let seconds = elapsed.num_seconds().max(0);
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if days > 0 {
        if hours > 0 {
            format!("{}, {}", plural(days, "day"), plural(hours, "hour"))
        } else {
            plural(days, "day")
        }
    } else if hours > 0 {
        if minutes > 0 {
            format!("{}, {}", plural(hours, "hour"), plural(minutes, "minute"))
        } else {
            plural(hours, "hour")
        }
    } else if minutes > 0 {
        plural(minutes, "minute")
    } else {
        plural(seconds, "second")
    }
}

/// Time spent since `since`, or [`NEVER_MOVED`] when there is no such point.
#[must_use]
pub fn format_time_on_host(since: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    since.map_or_else(
        || NEVER_MOVED.to_string(),
        |since| format_elapsed(now.signed_duration_since(since)),
    )
}

/// Format a relative time (past or future).
#[must_use]
pub fn format_relative_time(target: DateTime<Utc>) -> String {
    let now = Utc::now();
    let duration = now.signed_duration_since(target);

    if duration.num_seconds().abs() < 60 {
        return "just now".to_string();
    }

    let suffix = if duration.num_seconds() > 0 {
        "ago"
    } else {
        "from now"
    };

    format!("{} {suffix}", format_elapsed(duration.abs()))
}

/// Local wall-clock rendering used in listings.
#[must_use]
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_keeps_two_units() {
        assert_eq!(
            format_elapsed(TimeDelta::days(3) + TimeDelta::hours(4) + TimeDelta::minutes(5)),
            "3 days, 4 hours"
        );
        assert_eq!(format_elapsed(TimeDelta::hours(1)), "1 hour");
        assert_eq!(
            format_elapsed(TimeDelta::hours(2) + TimeDelta::minutes(1)),
            "2 hours, 1 minute"
        );
        assert_eq!(format_elapsed(TimeDelta::seconds(42)), "42 seconds");
    }

    #[test]
    fn negative_elapsed_clamps_to_zero() {
        assert_eq!(format_elapsed(TimeDelta::seconds(-5)), "0 seconds");
    }

    #[test]
    fn time_on_host_without_history() {
        let now = Utc::now();
        assert_eq!(format_time_on_host(None, now), NEVER_MOVED);
        assert_eq!(
            format_time_on_host(Some(now - TimeDelta::days(1)), now),
            "1 day"
        );
    }

    #[test]
    fn relative_time_direction() {
        let past = Utc::now() - TimeDelta::hours(3) - TimeDelta::seconds(30);
        assert!(format_relative_time(past).ends_with("ago"));
        let future = Utc::now() + TimeDelta::days(3);
        assert!(format_relative_time(future).ends_with("from now"));
        assert_eq!(format_relative_time(Utc::now()), "just now");
    }
}
