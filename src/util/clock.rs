//! Wall-clock helpers for timestamps recorded on backend records.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Format a Unix millisecond timestamp as `HH:MM:SS` (UTC).
///
/// A zero timestamp is rendered as `N/A`.
pub fn format_clock(millis: u64) -> String {
    if millis == 0 {
        return "N/A".to_string();
    }
    let secs = (millis / 1000) % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
