use chrono::{DateTime, Utc};
use std::time::Duration;

/// Whole seconds from `start` to `end`, zero if `end` is earlier.
pub fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
    (end - start).num_seconds().clamp(0, u32::MAX as i64) as u32
}

/// Time left of a `total` window that opened at `started_at`.
pub fn remaining_since(started_at: DateTime<Utc>, total: Duration, now: DateTime<Utc>) -> Duration {
    let elapsed = (now - started_at).to_std().unwrap_or(Duration::ZERO);
    total.saturating_sub(elapsed)
}
