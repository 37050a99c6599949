use chrono::{DateTime, Utc};

/// Current time as epoch milliseconds, the unit the store works in.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert stored epoch milliseconds to a wire timestamp.
pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
