//! Trash retention window
//!
//! The core never purges on its own; it only reports which soft-deleted
//! records a higher-level sweep may remove.

use crate::model::ValveRecord;
use chrono::{DateTime, Duration, Utc};

/// Longest accepted trash window
pub const MAX_RETENTION_DAYS: i64 = 3650;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window: Duration,
}

impl RetentionPolicy {
    pub fn new(days: i64) -> Self {
        Self {
            window: Duration::days(days.clamp(0, MAX_RETENTION_DAYS)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Whether a record deleted at `deleted_at` is past the window at `now`
    ///
    /// A window end beyond the representable range never expires.
    pub fn is_expired(&self, deleted_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        deleted_at
            .checked_add_signed(self.window)
            .map_or(false, |end| end <= now)
    }

    /// Time left before a trashed record becomes purgeable; zero once expired
    pub fn remaining(&self, deleted_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        deleted_at
            .checked_add_signed(self.window)
            .map_or(self.window, |end| end.signed_duration_since(now))
            .max(Duration::zero())
    }

    pub fn purge_candidates(&self, records: &[ValveRecord], now: DateTime<Utc>) -> Vec<String> {
        records
            .iter()
            .filter(|r| r.deleted_at.map_or(false, |at| self.is_expired(at, now)))
            .filter_map(|r| r.id.clone())
            .collect()
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_boundaries() {
        let policy = RetentionPolicy::default();
        let deleted = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        assert!(!policy.is_expired(deleted, deleted + Duration::days(4)));
        assert!(policy.is_expired(deleted, deleted + Duration::days(5)));
        assert_eq!(policy.remaining(deleted, deleted + Duration::days(3)), Duration::days(2));
        assert_eq!(policy.remaining(deleted, deleted + Duration::days(9)), Duration::zero());
    }

    #[test]
    fn test_purge_candidates_ignore_active() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let records = vec![
            ValveRecord { id: Some("active".into()), ..Default::default() },
            ValveRecord {
                id: Some("old".into()),
                deleted_at: Some(now - Duration::days(6)),
                ..Default::default()
            },
            ValveRecord {
                id: Some("recent".into()),
                deleted_at: Some(now - Duration::days(1)),
                ..Default::default()
            },
        ];

        assert_eq!(RetentionPolicy::new(5).purge_candidates(&records, now), vec!["old".to_string()]);
    }

    #[test]
    fn test_huge_window_is_clamped_and_never_panics() {
        let policy = RetentionPolicy::new(i64::MAX);
        assert_eq!(policy.window(), Duration::days(MAX_RETENTION_DAYS));

        let deleted = DateTime::<Utc>::MAX_UTC - Duration::days(1);
        assert!(!policy.is_expired(deleted, DateTime::<Utc>::MAX_UTC));
        assert_eq!(policy.remaining(deleted, DateTime::<Utc>::MAX_UTC), policy.window());
    }
}
