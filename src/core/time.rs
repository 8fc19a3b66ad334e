use chrono::{DateTime, Utc};

pub fn now_utc() -> DateTime<Utc> {
    if let Ok(value) = std::env::var("ANYRUN_SYNC_FIXED_TIME") {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
            return dt.with_timezone(&Utc);
        }
    }
    Utc::now()
}

/// Day bucket used for the audit dump directory.
pub fn day_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d").to_string()
}
