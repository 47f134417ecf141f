use chrono::{DateTime, Utc};

pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Milliseconds since epoch → UTC timestamp; out-of-range values clamp to the epoch.
pub fn ms_to_utc(ts_ms: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts_ms as i64).unwrap_or_default()
}
