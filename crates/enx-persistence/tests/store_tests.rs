//! Record store integration tests
//!
//! Covers idempotent inserts, retention correctness, the distribution query
//! and file-backed persistence.

use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};
use enx_persistence::{
    hours_since_epoch, DiagnosisKey, RecordStore, ReportType, RetentionPolicy, StorageError,
    DEFAULT_BUSY_TIMEOUT,
};
use tempfile::TempDir;

fn key(seed: u8, submitted: i64, risk: i32) -> DiagnosisKey {
    DiagnosisKey::builder()
        .key_data(vec![seed; 16])
        .rolling_start_interval_number(2_660_000 + u32::from(seed))
        .rolling_period(144)
        .submission_timestamp(submitted)
        .transmission_risk_level(risk)
        .origin_country("DE")
        .visited_countries(["DK", "NL"])
        .report_type(ReportType::ConfirmedTest)
        .days_since_onset_of_symptoms(2)
        .consent_to_federation(true)
        .build()
        .unwrap()
}

// === Idempotent insert ===

#[test]
fn test_same_key_data_stored_once() {
    let store = RecordStore::open_in_memory().unwrap();

    assert!(store.insert_if_absent(&key(1, 100, 5)).unwrap());
    assert!(!store.insert_if_absent(&key(1, 100, 5)).unwrap());

    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_insert_all_counts_only_new_rows() {
    let store = RecordStore::open_in_memory().unwrap();
    store.insert_if_absent(&key(1, 100, 5)).unwrap();

    let batch = vec![key(1, 100, 5), key(2, 101, 5), key(3, 102, 5), key(2, 101, 5)];
    assert_eq!(store.insert_all(&batch).unwrap(), 2);
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_invalid_key_in_batch_stores_nothing() {
    let store = RecordStore::open_in_memory().unwrap();
    let mut bad = key(2, 100, 5);
    bad.transmission_risk_level = 0;

    assert!(store.insert_all(&[key(1, 100, 5), bad]).is_err());
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_concurrent_duplicate_inserts() {
    let store = Arc::new(RecordStore::open_in_memory().unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..20u8)
                    .filter(|seed| store.insert_if_absent(&key(*seed, 100, 5)).unwrap())
                    .count()
            })
        })
        .collect();

    let created: usize = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .sum();

    // Each distinct key is created by exactly one caller
    assert_eq!(created, 20);
    assert_eq!(store.count().unwrap(), 20);
}

// === Retention ===

#[test]
fn test_delete_expired_keeps_threshold_and_newer() {
    let store = RecordStore::open_in_memory().unwrap();
    for (seed, submitted) in [(1, 90), (2, 99), (3, 100), (4, 101), (5, 150)] {
        store.insert_if_absent(&key(seed, submitted, 5)).unwrap();
    }

    assert_eq!(store.count_expired(100).unwrap(), 2);
    assert_eq!(store.delete_expired(100).unwrap(), 2);
    assert_eq!(store.count_expired(100).unwrap(), 0);

    let remaining: Vec<_> = store
        .query_by_risk_and_time(1, 0)
        .unwrap()
        .into_iter()
        .map(|k| k.submission_timestamp)
        .collect();
    assert_eq!(remaining, vec![100, 101, 150]);
}

#[test]
fn test_delete_expired_is_idempotent() {
    let store = RecordStore::open_in_memory().unwrap();
    store.insert_if_absent(&key(1, 10, 5)).unwrap();
    store.insert_if_absent(&key(2, 20, 5)).unwrap();

    assert_eq!(store.delete_expired(15).unwrap(), 1);
    assert_eq!(store.delete_expired(15).unwrap(), 0);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_retention_policy_sweep() {
    let store = RecordStore::open_in_memory().unwrap();
    let now = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
    let current = hours_since_epoch(now);

    store.insert_if_absent(&key(1, current - 15 * 24, 5)).unwrap();
    store.insert_if_absent(&key(2, current - 14 * 24, 5)).unwrap();
    store.insert_if_absent(&key(3, current, 5)).unwrap();

    let outcome = RetentionPolicy::keep_days(14).apply(&store, now).unwrap();
    assert_eq!(outcome.threshold, current - 14 * 24);
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(store.count().unwrap(), 2);

    let again = RetentionPolicy::keep_days(14).apply(&store, now).unwrap();
    assert_eq!(again.deleted, 0);
}

#[test]
fn test_retention_dry_run_deletes_nothing() {
    let store = RecordStore::open_in_memory().unwrap();
    let now = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
    store
        .insert_if_absent(&key(1, hours_since_epoch(now) - 30 * 24, 5))
        .unwrap();

    let outcome = RetentionPolicy::keep_days(14)
        .with_dry_run()
        .apply(&store, now)
        .unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.deleted, 0);
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn test_zero_day_retention_rejected() {
    let store = RecordStore::open_in_memory().unwrap();
    let now = Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap();
    store
        .insert_if_absent(&key(1, hours_since_epoch(now) - 1, 5))
        .unwrap();

    let err = RetentionPolicy::keep_days(0).apply(&store, now).unwrap_err();
    assert!(matches!(err, StorageError::InvalidRetention(0)));
    assert_eq!(store.count().unwrap(), 1);
}

// === Distribution query ===

#[test]
fn test_query_filters_and_orders() {
    let store = RecordStore::open_in_memory().unwrap();
    store.insert_if_absent(&key(1, 300, 8)).unwrap();
    store.insert_if_absent(&key(2, 100, 8)).unwrap();
    store.insert_if_absent(&key(3, 200, 2)).unwrap();
    store.insert_if_absent(&key(4, 200, 6)).unwrap();
    store.insert_if_absent(&key(5, 50, 8)).unwrap();

    let keys = store.query_by_risk_and_time(5, 100).unwrap();
    let seen: Vec<_> = keys
        .iter()
        .map(|k| (k.key_data[0], k.submission_timestamp))
        .collect();
    assert_eq!(seen, vec![(2, 100), (4, 200), (1, 300)]);
}

#[test]
fn test_query_empty_store() {
    let store = RecordStore::open_in_memory().unwrap();
    assert!(store.query_by_risk_and_time(1, 0).unwrap().is_empty());
}

// === File-backed store ===

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/keys.db");

    {
        let store = RecordStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
        assert!(store.insert_if_absent(&key(7, 100, 5)).unwrap());
    }

    let store = RecordStore::open(&path, DEFAULT_BUSY_TIMEOUT).unwrap();
    assert!(!store.insert_if_absent(&key(7, 100, 5)).unwrap());
    let keys = store.query_by_risk_and_time(1, 0).unwrap();
    assert_eq!(keys, vec![key(7, 100, 5)]);
}
