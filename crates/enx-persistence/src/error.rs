//! Storage error taxonomy

use thiserror::Error;

use crate::model::InvalidDiagnosisKey;

/// Errors surfaced by the record store.
///
/// None of these are retried by the store; retry policy belongs to the caller.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open store: {0}")]
    Open(String),

    #[error("schema migration failed: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("statement failed: {0}")]
    Statement(#[from] rusqlite::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("invalid retention period: {0} day(s), must be at least 1")]
    InvalidRetention(u32),

    #[error("invalid record: {0}")]
    InvalidRecord(#[from] InvalidDiagnosisKey),

    #[error("store connection mutex poisoned")]
    Poisoned,
}

/// Result type for store operations
pub type StorageResult<T> = Result<T, StorageError>;
