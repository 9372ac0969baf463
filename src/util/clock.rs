//! Wall-clock helper.

use chrono::Utc;

/// Current time as epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
