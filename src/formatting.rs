// src/formatting.rs

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Renders an offline duration as descending units: days, hours, minutes.
///
/// Units are pluralized and omitted when zero. A positive duration shorter
/// than a minute renders as "Just now"; zero or negative durations have no
/// rendering at all.
pub fn format_duration(seconds: i64) -> Option<String> {
    if seconds <= 0 {
        return None;
    }

    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(pluralize(days, "day"));
    }
    if hours > 0 {
        parts.push(pluralize(hours, "hour"));
    }
    if minutes > 0 {
        parts.push(pluralize(minutes, "minute"));
    }

    if parts.is_empty() {
        Some("Just now".to_string())
    } else {
        Some(parts.join(", "))
    }
}

fn pluralize(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Parses a probe-supplied timestamp.
///
/// Probes emit RFC 3339 with an offset, a naive `T`-separated isoformat
/// (Python's `datetime.now().isoformat()`), or the SQL `datetime('now')`
/// shape. Naive values are taken as UTC. Anything else is `None` and the
/// caller degrades per its own rules.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_format_duration_descending_units() {
        assert_eq!(
            format_duration(90_061),
            Some("1 day, 1 hour, 1 minute".to_string())
        );
        assert_eq!(
            format_duration(2 * 86_400 + 3 * 3_600),
            Some("2 days, 3 hours".to_string())
        );
        assert_eq!(format_duration(120), Some("2 minutes".to_string()));
        assert_eq!(format_duration(3_600), Some("1 hour".to_string()));
    }

    #[test]
    fn test_format_duration_sub_minute_is_just_now() {
        assert_eq!(format_duration(45), Some("Just now".to_string()));
        assert_eq!(format_duration(1), Some("Just now".to_string()));
    }

    #[test]
    fn test_format_duration_zero_or_negative_is_none() {
        assert_eq!(format_duration(0), None);
        assert_eq!(format_duration(-30), None);
    }

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_timestamp("2025-07-05T10:30:00Z").unwrap();
        assert_eq!(ts.hour(), 10);
        let with_offset = parse_timestamp("2025-07-05T12:30:00+02:00").unwrap();
        assert_eq!(with_offset, ts);
    }

    #[test]
    fn test_parse_naive_isoformat() {
        // datetime.now().isoformat() carries no offset.
        assert!(parse_timestamp("2025-07-05T10:30:00.123456").is_some());
        assert!(parse_timestamp("2025-07-05T10:30:00").is_some());
        // datetime('now') uses a space separator.
        assert!(parse_timestamp("2025-07-05 10:30:00").is_some());
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a timestamp").is_none());
        assert!(parse_timestamp("2025-13-99T99:99:99").is_none());
    }
}
