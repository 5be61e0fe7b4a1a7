//! Binary payload encoders
//!
//! [`CborEncoder`] serializes any collection of records as one CBOR array.
//! [`KeyExportEncoder`] produces the diagnosis-key export format: a fixed
//! 16-byte header followed by a CBOR [`KeyExport`] document.

use enx_persistence::{DiagnosisKey, ReportType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header prefixed to every key export payload
pub const KEY_EXPORT_HEADER: &[u8; 16] = b"EK Export v1    ";

/// Errors raised while encoding a partition
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("CBOR encoding error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    #[error("payload does not start with the key export header")]
    InvalidHeader,
}

/// Serializes a partition of records into a compact binary payload
pub trait Encoder<T> {
    fn encode(&self, items: &[T]) -> Result<Vec<u8>, EncodingError>;
}

/// CBOR encoding of a record sequence
#[derive(Debug, Clone, Copy, Default)]
pub struct CborEncoder;

impl<T: Serialize> Encoder<T> for CborEncoder {
    fn encode(&self, items: &[T]) -> Result<Vec<u8>, EncodingError> {
        Ok(serde_cbor::to_vec(&items)?)
    }
}

/// One key as distributed to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedKey {
    #[serde(with = "serde_bytes")]
    pub key_data: Vec<u8>,
    pub rolling_start_interval_number: u32,
    pub rolling_period: u32,
    pub transmission_risk_level: i32,
    pub report_type: ReportType,
    pub days_since_onset_of_symptoms: i32,
}

impl From<&DiagnosisKey> for ExportedKey {
    fn from(key: &DiagnosisKey) -> Self {
        Self {
            key_data: key.key_data.clone(),
            rolling_start_interval_number: key.rolling_start_interval_number,
            rolling_period: key.rolling_period,
            transmission_risk_level: key.transmission_risk_level,
            report_type: key.report_type,
            days_since_onset_of_symptoms: key.days_since_onset_of_symptoms,
        }
    }
}

/// Key export document for one distribution window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyExport {
    /// Window start, seconds since the Unix epoch
    pub start_timestamp: i64,
    /// Window end (exclusive), seconds since the Unix epoch
    pub end_timestamp: i64,
    pub region: String,
    pub batch_num: u32,
    pub batch_size: u32,
    pub keys: Vec<ExportedKey>,
}

/// Encoder for one window's key export
#[derive(Debug, Clone)]
pub struct KeyExportEncoder {
    region: String,
    start_timestamp: i64,
    end_timestamp: i64,
}

impl KeyExportEncoder {
    pub fn new(region: impl Into<String>, start_timestamp: i64, end_timestamp: i64) -> Self {
        Self {
            region: region.into(),
            start_timestamp,
            end_timestamp,
        }
    }

    /// Build the export document; keys are ordered by key data
    pub fn export(&self, keys: &[DiagnosisKey]) -> KeyExport {
        let mut exported: Vec<ExportedKey> = keys.iter().map(ExportedKey::from).collect();
        exported.sort_by(|a, b| a.key_data.cmp(&b.key_data));

        KeyExport {
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
            region: self.region.clone(),
            batch_num: 1,
            batch_size: 1,
            keys: exported,
        }
    }

    /// Parse a payload produced by [`Encoder::encode`]
    pub fn decode(payload: &[u8]) -> Result<KeyExport, EncodingError> {
        let body = payload
            .strip_prefix(KEY_EXPORT_HEADER.as_slice())
            .ok_or(EncodingError::InvalidHeader)?;
        Ok(serde_cbor::from_slice(body)?)
    }
}

impl Encoder<DiagnosisKey> for KeyExportEncoder {
    fn encode(&self, keys: &[DiagnosisKey]) -> Result<Vec<u8>, EncodingError> {
        let mut payload = KEY_EXPORT_HEADER.to_vec();
        serde_cbor::to_writer(&mut payload, &self.export(keys))?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> DiagnosisKey {
        DiagnosisKey::builder()
            .key_data(vec![seed; 16])
            .rolling_start_interval_number(2_660_000)
            .submission_timestamp(443_000)
            .transmission_risk_level(6)
            .origin_country("DE")
            .build()
            .unwrap()
    }

    #[test]
    fn test_cbor_encoder_deterministic() {
        let items = vec!["a".to_string(), "b".to_string()];
        let first = CborEncoder.encode(items.as_slice()).unwrap();
        assert_eq!(first, CborEncoder.encode(items.as_slice()).unwrap());

        let decoded: Vec<String> = serde_cbor::from_slice(&first).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn test_key_export_header_and_order() {
        let encoder = KeyExportEncoder::new("DE", 1_594_800_000, 1_594_803_600);
        let payload = encoder.encode(&[key(9), key(1), key(5)]).unwrap();

        assert_eq!(&payload[..16], b"EK Export v1    ");
        let export = KeyExportEncoder::decode(&payload).unwrap();
        assert_eq!(export.region, "DE");
        assert_eq!(export.end_timestamp - export.start_timestamp, 3600);
        let firsts: Vec<u8> = export.keys.iter().map(|k| k.key_data[0]).collect();
        assert_eq!(firsts, vec![1, 5, 9]);
    }

    #[test]
    fn test_key_export_independent_of_input_order() {
        let encoder = KeyExportEncoder::new("DE", 0, 3600);
        assert_eq!(
            encoder.encode(&[key(1), key(2)]).unwrap(),
            encoder.encode(&[key(2), key(1)]).unwrap()
        );
    }

    #[test]
    fn test_key_data_is_byte_string() {
        let encoded = serde_cbor::to_vec(&ExportedKey::from(&key(7))).unwrap();
        let value: serde_cbor::Value = serde_cbor::from_slice(&encoded).unwrap();
        let serde_cbor::Value::Map(fields) = value else {
            panic!("exported key is not a CBOR map");
        };
        assert_eq!(
            fields.get(&serde_cbor::Value::Text("key_data".into())),
            Some(&serde_cbor::Value::Bytes(vec![7; 16]))
        );
    }

    #[test]
    fn test_decode_rejects_missing_header() {
        assert!(matches!(
            KeyExportEncoder::decode(b"not an export"),
            Err(EncodingError::InvalidHeader)
        ));
    }
}
