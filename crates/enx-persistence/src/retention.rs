//! Retention sweep for diagnosis keys
//!
//! Keys are kept for a configured number of days counted in whole hours
//! from their submission timestamp. The sweep may run concurrently with
//! ingestion: it only removes rows strictly older than the threshold, and
//! new submissions always carry the current hour.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};
use crate::store::RecordStore;

/// Convert a point in time into hours since the Unix epoch
pub fn hours_since_epoch(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(3600)
}

/// Retention policy for stored keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Days a key is kept after submission
    pub retention_days: u32,
    /// Count only, delete nothing
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: 14,
            dry_run: false,
        }
    }
}

/// Result of one retention sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionOutcome {
    /// Submission timestamp (hours since epoch) below which keys expire
    pub threshold: i64,
    /// Keys found expired
    pub expired: u64,
    /// Keys actually deleted (0 in dry-run mode)
    pub deleted: u64,
}

impl RetentionPolicy {
    /// Create an age-based policy.
    pub fn keep_days(days: u32) -> Self {
        Self {
            retention_days: days,
            dry_run: false,
        }
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    /// Threshold for a sweep performed at `now`
    pub fn threshold(&self, now: DateTime<Utc>) -> i64 {
        hours_since_epoch(now) - i64::from(self.retention_days) * 24
    }

    /// Count and delete expired keys; a zero-day period is rejected
    pub fn apply(&self, store: &RecordStore, now: DateTime<Utc>) -> StorageResult<RetentionOutcome> {
        if self.retention_days == 0 {
            return Err(StorageError::InvalidRetention(self.retention_days));
        }
        let threshold = self.threshold(now);
        let expired = store.count_expired(threshold)?;

        tracing::info!(
            expired,
            threshold,
            dry_run = self.dry_run,
            "Deleting {} diagnosis key(s) with a submission timestamp older than {} day(s) ago.",
            expired,
            self.retention_days
        );

        let deleted = if self.dry_run || expired == 0 {
            0
        } else {
            store.delete_expired(threshold)?
        };

        Ok(RetentionOutcome {
            threshold,
            expired,
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hours_since_epoch() {
        let at = Utc.with_ymd_and_hms(1970, 1, 2, 1, 59, 59).unwrap();
        assert_eq!(hours_since_epoch(at), 25);
    }

    #[test]
    fn test_threshold() {
        let now = Utc.with_ymd_and_hms(2020, 7, 1, 12, 30, 0).unwrap();
        let policy = RetentionPolicy::keep_days(14);
        assert_eq!(policy.threshold(now), hours_since_epoch(now) - 336);
    }

    #[test]
    fn test_default_policy() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.retention_days, 14);
        assert!(!policy.dry_run);
        assert!(RetentionPolicy::keep_days(3).with_dry_run().dry_run);
    }
}
