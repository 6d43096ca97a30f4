use chrono::{DateTime, Utc};

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z, the reference
/// date the legacy store counts its timestamps from.
pub const LEGACY_REFERENCE_OFFSET_SECS: i64 = 978_307_200;

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Converts a legacy REAL timestamp (seconds since the reference date) into
/// Unix milliseconds. Non-finite values are rejected.
pub fn legacy_seconds_to_ms(seconds: f64) -> Option<i64> {
    if !seconds.is_finite() {
        return None;
    }
    let ms = (seconds * 1000.0).round() + (LEGACY_REFERENCE_OFFSET_SECS as f64) * 1000.0;
    if ms < i64::MIN as f64 || ms > i64::MAX as f64 {
        return None;
    }
    Some(ms as i64)
}

pub fn to_date(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}
