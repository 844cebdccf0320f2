//! Timestamp and duration utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert whole hours to a duration, `None` on overflow
pub fn checked_hours(hours: u64) -> Option<Duration> {
    hours.checked_mul(3600).map(Duration::from_secs)
}

/// Convert whole hours to a duration, saturating at `u64::MAX` seconds
pub fn hours(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(3600))
}

/// Render a remaining-time span for participant-facing notices.
///
/// Whole hours render as `N hour(s)`; anything shorter than an hour (or not
/// hour-aligned) falls back to minutes, and sub-minute spans to seconds.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{} hour(s)", secs / 3600)
    } else if secs >= 60 {
        format!("{} minute(s)", secs.div_ceil(60))
    } else {
        format!("{} second(s)", secs)
    }
}
