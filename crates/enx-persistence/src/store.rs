//! SQLite-backed diagnosis key store
//!
//! Every statement binds its values as parameters. Inserts are a single
//! `INSERT ... ON CONFLICT DO NOTHING`, so concurrent submissions of the same
//! key never race and an existing row is never overwritten.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, Row, Statement};

use crate::error::{StorageError, StorageResult};
use crate::migrations::migrations;
use crate::model::{DiagnosisKey, ReportType};

/// Default busy timeout for file-backed stores
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const INSERT_SQL: &str = "INSERT INTO diagnosis_key (
        key_data, rolling_start_interval_number, rolling_period, submission_timestamp,
        transmission_risk_level, origin_country, visited_countries, report_type,
        days_since_onset_of_symptoms, consent_to_federation
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT DO NOTHING";

const SELECT_COLUMNS: &str = "key_data, rolling_start_interval_number, rolling_period, \
     submission_timestamp, transmission_risk_level, origin_country, visited_countries, \
     report_type, days_since_onset_of_symptoms, consent_to_federation";

/// Deduplicating, retention-bounded store of diagnosis keys
pub struct RecordStore {
    connection: Mutex<Connection>,
}

impl RecordStore {
    /// Open (or create) a file-backed store, enable WAL and run migrations
    pub fn open(path: &Path, busy_timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Open(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let mut conn = Connection::open(path)
            .map_err(|e| StorageError::Open(format!("{}: {}", path.display(), e)))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(busy_timeout)?;
        migrations().to_latest(&mut conn)?;

        tracing::info!(path = %path.display(), "diagnosis key store opened");
        Ok(Self {
            connection: Mutex::new(conn),
        })
    }

    /// Open a private in-memory store
    pub fn open_in_memory() -> StorageResult<Self> {
        let mut conn =
            Connection::open_in_memory().map_err(|e| StorageError::Open(e.to_string()))?;
        migrations().to_latest(&mut conn)?;
        Ok(Self {
            connection: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.connection.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Insert the key unless a row with the same key data exists.
    ///
    /// Returns `true` when a row was created, `false` when the key was
    /// already present (the stored row is left untouched).
    pub fn insert_if_absent(&self, key: &DiagnosisKey) -> StorageResult<bool> {
        key.validate()?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(INSERT_SQL)?;
        execute_insert(&mut stmt, key)
    }

    /// Insert a batch of keys in one transaction, returning how many were new
    pub fn insert_all(&self, keys: &[DiagnosisKey]) -> StorageResult<usize> {
        for key in keys {
            key.validate()?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(INSERT_SQL)?;
            for key in keys {
                if execute_insert(&mut stmt, key)? {
                    inserted += 1;
                }
            }
        }
        tx.commit()?;

        tracing::debug!(submitted = keys.len(), inserted, "diagnosis keys stored");
        Ok(inserted)
    }

    /// Count keys submitted strictly before `threshold` (hours since epoch)
    pub fn count_expired(&self, threshold: i64) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM diagnosis_key WHERE submission_timestamp < ?1",
            params![threshold],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Delete keys submitted strictly before `threshold`, returning the row count
    pub fn delete_expired(&self, threshold: i64) -> StorageResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM diagnosis_key WHERE submission_timestamp < ?1",
            params![threshold],
        )?;
        Ok(deleted as u64)
    }

    /// Keys with at least `min_risk` submitted at or after `since`,
    /// ascending by submission timestamp (ties by key data)
    pub fn query_by_risk_and_time(
        &self,
        min_risk: i32,
        since: i64,
    ) -> StorageResult<Vec<DiagnosisKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM diagnosis_key \
             WHERE transmission_risk_level >= ?1 AND submission_timestamp >= ?2 \
             ORDER BY submission_timestamp ASC, key_data ASC"
        ))?;

        let rows = stmt.query_map(params![min_risk, since], read_row)?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row??);
        }
        Ok(keys)
    }

    /// Total number of stored keys
    pub fn count(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM diagnosis_key", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn execute_insert(stmt: &mut Statement<'_>, key: &DiagnosisKey) -> StorageResult<bool> {
    let visited = serde_json::to_string(&key.visited_countries)
        .map_err(|e| StorageError::CorruptRow(e.to_string()))?;
    let changed = stmt.execute(params![
        key.key_data,
        key.rolling_start_interval_number,
        key.rolling_period,
        key.submission_timestamp,
        key.transmission_risk_level,
        key.origin_country,
        visited,
        key.report_type.as_str(),
        key.days_since_onset_of_symptoms,
        key.consent_to_federation,
    ])?;
    Ok(changed == 1)
}

/// Map a row to a key; decoding failures of stored text surface as `CorruptRow`
fn read_row(row: &Row<'_>) -> rusqlite::Result<StorageResult<DiagnosisKey>> {
    let visited: String = row.get(6)?;
    let report_type: String = row.get(7)?;

    let visited_countries = match serde_json::from_str::<BTreeSet<String>>(&visited) {
        Ok(v) => v,
        Err(e) => return Ok(Err(StorageError::CorruptRow(format!("visited_countries: {}", e)))),
    };
    let report_type = match report_type.parse::<ReportType>() {
        Ok(r) => r,
        Err(e) => return Ok(Err(StorageError::CorruptRow(format!("report_type: {}", e)))),
    };

    Ok(Ok(DiagnosisKey {
        key_data: row.get(0)?,
        rolling_start_interval_number: row.get(1)?,
        rolling_period: row.get(2)?,
        submission_timestamp: row.get(3)?,
        transmission_risk_level: row.get(4)?,
        origin_country: row.get(5)?,
        visited_countries,
        report_type,
        days_since_onset_of_symptoms: row.get(8)?,
        consent_to_federation: row.get(9)?,
    }))
}
