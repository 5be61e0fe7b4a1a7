//! Diagnosis key domain model
//!
//! A diagnosis key is one exposure-notification key submission. Records are
//! validated on construction; the store only ever sees valid keys.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the temporary exposure key in bytes
pub const KEY_DATA_LENGTH: usize = 16;

/// Maximum rolling period (144 ten-minute intervals = 24h)
pub const MAX_ROLLING_PERIOD: u32 = 144;

/// Valid transmission risk level range
pub const MIN_TRANSMISSION_RISK_LEVEL: i32 = 1;
pub const MAX_TRANSMISSION_RISK_LEVEL: i32 = 8;

/// Valid days-since-onset-of-symptoms range
pub const MIN_DAYS_SINCE_ONSET: i32 = -14;
pub const MAX_DAYS_SINCE_ONSET: i32 = 4000;

/// Report type attached to a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    Unknown,
    ConfirmedTest,
    ConfirmedClinicalDiagnosis,
    SelfReport,
    Recursive,
    Revoked,
}

impl ReportType {
    /// Stable string form used for persistence
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Unknown => "UNKNOWN",
            ReportType::ConfirmedTest => "CONFIRMED_TEST",
            ReportType::ConfirmedClinicalDiagnosis => "CONFIRMED_CLINICAL_DIAGNOSIS",
            ReportType::SelfReport => "SELF_REPORT",
            ReportType::Recursive => "RECURSIVE",
            ReportType::Revoked => "REVOKED",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = InvalidDiagnosisKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNKNOWN" => Ok(ReportType::Unknown),
            "CONFIRMED_TEST" => Ok(ReportType::ConfirmedTest),
            "CONFIRMED_CLINICAL_DIAGNOSIS" => Ok(ReportType::ConfirmedClinicalDiagnosis),
            "SELF_REPORT" => Ok(ReportType::SelfReport),
            "RECURSIVE" => Ok(ReportType::Recursive),
            "REVOKED" => Ok(ReportType::Revoked),
            other => Err(InvalidDiagnosisKey::ReportType(other.to_string())),
        }
    }
}

/// Reasons a diagnosis key is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDiagnosisKey {
    #[error("key data must be 16 bytes, got {0}")]
    KeyDataLength(usize),

    #[error("rolling period {0} outside 1..=144")]
    RollingPeriod(u32),

    #[error("transmission risk level {0} outside 1..=8")]
    TransmissionRiskLevel(i32),

    #[error("days since onset of symptoms {0} outside -14..=4000")]
    DaysSinceOnset(i32),

    #[error("invalid country code '{0}'")]
    CountryCode(String),

    #[error("unknown report type '{0}'")]
    ReportType(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// One persisted diagnosis key submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisKey {
    pub key_data: Vec<u8>,
    pub rolling_start_interval_number: u32,
    pub rolling_period: u32,
    /// Hours since the Unix epoch
    pub submission_timestamp: i64,
    pub transmission_risk_level: i32,
    pub origin_country: String,
    pub visited_countries: BTreeSet<String>,
    pub report_type: ReportType,
    pub days_since_onset_of_symptoms: i32,
    pub consent_to_federation: bool,
}

impl DiagnosisKey {
    /// Start building a key
    pub fn builder() -> DiagnosisKeyBuilder {
        DiagnosisKeyBuilder::default()
    }

    /// Check every field invariant
    pub fn validate(&self) -> Result<(), InvalidDiagnosisKey> {
        if self.key_data.len() != KEY_DATA_LENGTH {
            return Err(InvalidDiagnosisKey::KeyDataLength(self.key_data.len()));
        }
        if self.rolling_period == 0 || self.rolling_period > MAX_ROLLING_PERIOD {
            return Err(InvalidDiagnosisKey::RollingPeriod(self.rolling_period));
        }
        if !(MIN_TRANSMISSION_RISK_LEVEL..=MAX_TRANSMISSION_RISK_LEVEL)
            .contains(&self.transmission_risk_level)
        {
            return Err(InvalidDiagnosisKey::TransmissionRiskLevel(
                self.transmission_risk_level,
            ));
        }
        if !(MIN_DAYS_SINCE_ONSET..=MAX_DAYS_SINCE_ONSET)
            .contains(&self.days_since_onset_of_symptoms)
        {
            return Err(InvalidDiagnosisKey::DaysSinceOnset(
                self.days_since_onset_of_symptoms,
            ));
        }
        validate_country(&self.origin_country)?;
        for country in &self.visited_countries {
            validate_country(country)?;
        }
        Ok(())
    }
}

/// Country codes are ISO 3166 alpha-2, upper case
fn validate_country(code: &str) -> Result<(), InvalidDiagnosisKey> {
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(InvalidDiagnosisKey::CountryCode(code.to_string()))
    }
}

/// Builder for [`DiagnosisKey`]
#[derive(Debug, Clone, Default)]
pub struct DiagnosisKeyBuilder {
    key_data: Option<Vec<u8>>,
    rolling_start_interval_number: Option<u32>,
    rolling_period: u32,
    submission_timestamp: Option<i64>,
    transmission_risk_level: Option<i32>,
    origin_country: Option<String>,
    visited_countries: BTreeSet<String>,
    report_type: Option<ReportType>,
    days_since_onset_of_symptoms: i32,
    consent_to_federation: bool,
}

impl DiagnosisKeyBuilder {
    pub fn key_data(mut self, key_data: impl Into<Vec<u8>>) -> Self {
        self.key_data = Some(key_data.into());
        self
    }

    pub fn rolling_start_interval_number(mut self, value: u32) -> Self {
        self.rolling_start_interval_number = Some(value);
        self
    }

    pub fn rolling_period(mut self, value: u32) -> Self {
        self.rolling_period = value;
        self
    }

    pub fn submission_timestamp(mut self, hours_since_epoch: i64) -> Self {
        self.submission_timestamp = Some(hours_since_epoch);
        self
    }

    pub fn transmission_risk_level(mut self, value: i32) -> Self {
        self.transmission_risk_level = Some(value);
        self
    }

    pub fn origin_country(mut self, code: impl Into<String>) -> Self {
        self.origin_country = Some(code.into());
        self
    }

    pub fn visited_countries<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.visited_countries = codes.into_iter().map(Into::into).collect();
        self
    }

    pub fn report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    pub fn days_since_onset_of_symptoms(mut self, days: i32) -> Self {
        self.days_since_onset_of_symptoms = days;
        self
    }

    pub fn consent_to_federation(mut self, consent: bool) -> Self {
        self.consent_to_federation = consent;
        self
    }

    /// Assemble and validate.
    ///
    /// The rolling period defaults to the maximum and the origin country is
    /// always part of the visited countries.
    pub fn build(self) -> Result<DiagnosisKey, InvalidDiagnosisKey> {
        let origin_country = self
            .origin_country
            .ok_or(InvalidDiagnosisKey::MissingField("origin_country"))?;
        let mut visited_countries = self.visited_countries;
        visited_countries.insert(origin_country.clone());

        let key = DiagnosisKey {
            key_data: self
                .key_data
                .ok_or(InvalidDiagnosisKey::MissingField("key_data"))?,
            rolling_start_interval_number: self
                .rolling_start_interval_number
                .ok_or(InvalidDiagnosisKey::MissingField("rolling_start_interval_number"))?,
            rolling_period: if self.rolling_period == 0 {
                MAX_ROLLING_PERIOD
            } else {
                self.rolling_period
            },
            submission_timestamp: self
                .submission_timestamp
                .ok_or(InvalidDiagnosisKey::MissingField("submission_timestamp"))?,
            transmission_risk_level: self
                .transmission_risk_level
                .ok_or(InvalidDiagnosisKey::MissingField("transmission_risk_level"))?,
            origin_country,
            visited_countries,
            report_type: self.report_type.unwrap_or(ReportType::ConfirmedTest),
            days_since_onset_of_symptoms: self.days_since_onset_of_symptoms,
            consent_to_federation: self.consent_to_federation,
        };
        key.validate()?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> DiagnosisKeyBuilder {
        DiagnosisKey::builder()
            .key_data(vec![7u8; KEY_DATA_LENGTH])
            .rolling_start_interval_number(2_660_000)
            .submission_timestamp(443_000)
            .transmission_risk_level(5)
            .origin_country("DE")
    }

    #[test]
    fn test_builder_defaults() {
        let key = builder().build().unwrap();
        assert_eq!(key.rolling_period, MAX_ROLLING_PERIOD);
        assert_eq!(key.report_type, ReportType::ConfirmedTest);
        assert!(key.visited_countries.contains("DE"));
        assert!(!key.consent_to_federation);
    }

    #[test]
    fn test_origin_added_to_visited() {
        let key = builder().visited_countries(["FR", "NL"]).build().unwrap();
        let visited: Vec<_> = key.visited_countries.iter().cloned().collect();
        assert_eq!(visited, vec!["DE", "FR", "NL"]);
    }

    #[test]
    fn test_key_data_length_rejected() {
        let err = builder().key_data(vec![1u8; 15]).build().unwrap_err();
        assert_eq!(err, InvalidDiagnosisKey::KeyDataLength(15));
    }

    #[test]
    fn test_risk_level_bounds() {
        assert!(builder().transmission_risk_level(0).build().is_err());
        assert!(builder().transmission_risk_level(9).build().is_err());
        assert!(builder().transmission_risk_level(8).build().is_ok());
    }

    #[test]
    fn test_rolling_period_bounds() {
        let err = builder().rolling_period(145).build().unwrap_err();
        assert_eq!(err, InvalidDiagnosisKey::RollingPeriod(145));
    }

    #[test]
    fn test_country_code_rejected() {
        let err = builder().origin_country("de").build().unwrap_err();
        assert!(matches!(err, InvalidDiagnosisKey::CountryCode(_)));

        let err = builder().visited_countries(["FRA"]).build().unwrap_err();
        assert_eq!(err, InvalidDiagnosisKey::CountryCode("FRA".to_string()));
    }

    #[test]
    fn test_missing_field() {
        let err = DiagnosisKey::builder().origin_country("DE").build().unwrap_err();
        assert_eq!(err, InvalidDiagnosisKey::MissingField("key_data"));
    }

    #[test]
    fn test_report_type_string_form() {
        for report_type in [
            ReportType::Unknown,
            ReportType::ConfirmedTest,
            ReportType::ConfirmedClinicalDiagnosis,
            ReportType::SelfReport,
            ReportType::Recursive,
            ReportType::Revoked,
        ] {
            assert_eq!(report_type.as_str().parse::<ReportType>().unwrap(), report_type);
        }
        assert!("POSITIVE".parse::<ReportType>().is_err());
    }
}
