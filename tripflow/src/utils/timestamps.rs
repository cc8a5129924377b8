//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Formats a timestamp so that lexical order equals chronological order.
///
/// Layout is `YYYYMMDDTHHMMSS_mmm` (milliseconds last).
#[must_use]
pub fn sortable_stamp(dt: &Timestamp) -> String {
    dt.format("%Y%m%dT%H%M%S_%3f").to_string()
}

/// Formats a timestamp for human-facing report headers.
#[must_use]
pub fn human_timestamp(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sortable_stamp_layout() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 9, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42);
        assert_eq!(sortable_stamp(&dt), "20240615T090507_042");
    }

    #[test]
    fn test_sortable_stamp_orders_lexically() {
        let earlier = Utc.with_ymd_and_hms(2024, 6, 15, 9, 5, 7).unwrap();
        let later = earlier + chrono::Duration::milliseconds(1);
        let much_later = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(sortable_stamp(&earlier) < sortable_stamp(&later));
        assert!(sortable_stamp(&later) < sortable_stamp(&much_later));
    }

    #[test]
    fn test_human_timestamp() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 9, 5, 7).unwrap();
        assert_eq!(human_timestamp(&dt), "2024-06-15 09:05:07 UTC");
    }
}
