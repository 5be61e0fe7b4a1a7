//! Diagnosis key persistence
//!
//! A deduplicating SQLite store for diagnosis keys plus the retention sweep
//! that retires them. Keys are unique by key data; inserting an existing key
//! is a silent no-op.

pub mod error;
pub mod migrations;
pub mod model;
pub mod retention;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use model::{DiagnosisKey, DiagnosisKeyBuilder, InvalidDiagnosisKey, ReportType, KEY_DATA_LENGTH};
pub use retention::{hours_since_epoch, RetentionOutcome, RetentionPolicy};
pub use store::{RecordStore, DEFAULT_BUSY_TIMEOUT};
