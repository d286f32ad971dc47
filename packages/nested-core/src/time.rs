//! Wall-clock helpers.
//!
//! Row timestamps are Unix seconds. Cache deadlines and event timestamps
//! are Unix milliseconds.

use std::time::Duration;

/// Current Unix time in seconds, as stored in `created_at` / `updated_at`.
pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current Unix time in milliseconds.
pub fn now_timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Millisecond deadline `ttl` from now. Saturates instead of overflowing.
pub fn deadline_after(ttl: Duration) -> i64 {
    let ttl_millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_timestamp_millis().saturating_add(ttl_millis)
}

/// Whether a millisecond deadline has been reached.
pub fn has_passed(deadline_millis: i64) -> bool {
    deadline_millis <= now_timestamp_millis()
}
