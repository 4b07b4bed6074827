//! Time range selection and wire-format resolution.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// User-selected time range: a relative lookback ending "now", or an
/// absolute window in epoch milliseconds. Resolution to wire timestamps
/// happens at query time, not at selection time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeRange {
    Relative { lookback_minutes: i64 },
    Absolute { start_millis: i64, end_millis: i64 },
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::Relative { lookback_minutes: 15 }
    }
}

impl TimeRange {
    pub fn last_minutes(minutes: i64) -> Self {
        Self::Relative { lookback_minutes: minutes }
    }
}

/// Absolute `[start, end)` bounds in wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: String,
    pub end: String,
}

/// Wire timestamp format: UTC, extended ISO-8601, microsecond precision,
/// explicit `+00:00` offset. Local-time conversion (e.g. for a date picker)
/// happens before values get here, never inside.
pub fn format_wire_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

fn millis_to_utc(millis: i64) -> DateTime<Utc> {
    // Out-of-range millis clamp to the epoch rather than panicking.
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

/// Resolve a range to absolute wire-format bounds at query time.
pub fn resolve(range: TimeRange, now: DateTime<Utc>) -> ResolvedWindow {
    match range {
        TimeRange::Relative { lookback_minutes } => ResolvedWindow {
            start: format_wire_timestamp(now - Duration::minutes(lookback_minutes)),
            end: format_wire_timestamp(now),
        },
        TimeRange::Absolute { start_millis, end_millis } => ResolvedWindow {
            start: format_wire_timestamp(millis_to_utc(start_millis)),
            end: format_wire_timestamp(millis_to_utc(end_millis)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_relative_window() {
        let now = at("2024-01-01T12:00:00Z");
        let window = resolve(TimeRange::last_minutes(60), now);
        assert_eq!(window.start, "2024-01-01T11:00:00.000000+00:00");
        assert_eq!(window.end, "2024-01-01T12:00:00.000000+00:00");
    }

    #[test]
    fn test_absolute_window() {
        let window = resolve(
            TimeRange::Absolute {
                start_millis: 1_704_103_200_000, // 2024-01-01T10:00:00Z
                end_millis: 1_704_106_800_500,   // 2024-01-01T11:00:00.5Z
            },
            at("2030-01-01T00:00:00Z"), // now must not matter
        );
        assert_eq!(window.start, "2024-01-01T10:00:00.000000+00:00");
        assert_eq!(window.end, "2024-01-01T11:00:00.500000+00:00");
    }

    #[test]
    fn test_microsecond_precision_kept() {
        let now = at("2024-06-15T08:30:15.123456Z");
        let window = resolve(TimeRange::last_minutes(5), now);
        assert_eq!(window.end, "2024-06-15T08:30:15.123456+00:00");
        assert_eq!(window.start, "2024-06-15T08:25:15.123456+00:00");
    }

    #[test]
    fn test_explicit_utc_offset_always_present() {
        let window = resolve(TimeRange::default(), at("2024-01-01T00:00:00Z"));
        assert!(window.start.ends_with("+00:00"));
        assert!(window.end.ends_with("+00:00"));
    }

    #[test]
    fn test_range_serde_roundtrip() {
        let range = TimeRange::Absolute { start_millis: 1, end_millis: 2 };
        let json = serde_json::to_string(&range).unwrap();
        assert!(json.contains("\"kind\":\"absolute\""));
        let back: TimeRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);
    }
}
