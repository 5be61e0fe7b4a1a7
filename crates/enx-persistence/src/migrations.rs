use rusqlite_migration::{Migrations, M};

/// Schema migrations for the diagnosis key store.
/// Applied versions are tracked through the SQLite user_version pragma.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: diagnosis keys

CREATE TABLE diagnosis_key (
    key_data BLOB PRIMARY KEY,
    rolling_start_interval_number INTEGER NOT NULL,
    rolling_period INTEGER NOT NULL,
    submission_timestamp INTEGER NOT NULL,
    transmission_risk_level INTEGER NOT NULL,
    origin_country TEXT NOT NULL,
    visited_countries TEXT NOT NULL,
    report_type TEXT NOT NULL,
    days_since_onset_of_symptoms INTEGER NOT NULL DEFAULT 0,
    consent_to_federation INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX idx_diagnosis_key_submission ON diagnosis_key(submission_timestamp);
",
        ),
        M::up(
            "-- Migration 2: distribution query index

CREATE INDEX idx_diagnosis_key_risk_submission
    ON diagnosis_key(transmission_risk_level, submission_timestamp);
",
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_valid() {
        assert!(migrations().validate().is_ok());
    }
}
