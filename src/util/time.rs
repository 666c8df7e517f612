// ABOUTME: Local-timezone timestamp helpers used across state and reporting
// ABOUTME: Produces second-precision ISO-8601 strings and wall-clock durations

use chrono::{DateTime, Local, SecondsFormat};

/// Current local time as an ISO-8601 string with second precision.
pub fn now_iso() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Wall-clock seconds between two instants.
pub fn duration_sec(start: DateTime<Local>, end: DateTime<Local>) -> f64 {
    (end - start).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_now_iso_has_offset() {
        let ts = now_iso();
        // RFC 3339 with offset: either +HH:MM/-HH:MM or Z
        assert!(ts.contains('T'));
        assert!(ts.len() >= 19);
    }

    #[test]
    fn test_duration_sec() {
        let start = Local::now();
        let end = start + Duration::milliseconds(1500);
        assert!((duration_sec(start, end) - 1.5).abs() < 1e-9);
    }
}
