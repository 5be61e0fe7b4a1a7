//! Ed25519 signing decorator for archives
//!
//! A [`SignedArchive`] wraps exactly one [`Archive`]. Its detached signature
//! covers the archive's own serialized bytes, and materializing it yields a
//! bundle of the archive's children with the signature file appended last.
//! Verification strips the signature file, re-bundles the remaining entries
//! and checks the signature over the reproduced bytes.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::bundle::{bundle_entries, unbundle};
use super::{Archive, MaterializedEntry, StructureError, Writable};

/// Signature algorithm identifier
pub const SIGNATURE_ALGORITHM: &str = "Ed25519";

/// Extension of detached signature files
pub const SIGNATURE_SUFFIX: &str = ".sig";

/// Errors from signing/verification operations
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// Result type for signing operations
pub type SigningResult<T> = Result<T, SigningError>;

/// Public identity a signer stamps into every signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    pub key_id: String,
    pub key_version: String,
    pub pubkey_fingerprint: String,
}

/// Signing primitive shared read-only by every partition worker
pub trait ArchiveSigner: Send + Sync {
    fn identity(&self) -> SignerIdentity;

    /// Raw signature bytes over `payload`
    fn sign(&self, payload: &[u8]) -> SigningResult<Vec<u8>>;
}

/// Detached signature document stored next to the signed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedSignature {
    /// Signature algorithm identifier (always "Ed25519")
    pub signature_algorithm: String,

    pub key_id: String,

    pub key_version: String,

    /// SHA-256 fingerprint of the signing public key (hex-encoded)
    pub pubkey_fingerprint: String,

    /// Base64-encoded signature over the archive bytes
    pub signature: String,
}

impl DetachedSignature {
    /// Sign `payload` with `signer`
    pub fn create(signer: &dyn ArchiveSigner, payload: &[u8]) -> SigningResult<Self> {
        let identity = signer.identity();
        let signature = signer.sign(payload)?;

        Ok(Self {
            signature_algorithm: SIGNATURE_ALGORITHM.to_string(),
            key_id: identity.key_id,
            key_version: identity.key_version,
            pubkey_fingerprint: identity.pubkey_fingerprint,
            signature: base64::engine::general_purpose::STANDARD.encode(signature),
        })
    }

    /// Verify the signature over `payload` against a verifying key
    pub fn verify(&self, verifying_key: &VerifyingKey, payload: &[u8]) -> SigningResult<bool> {
        if self.signature_algorithm != SIGNATURE_ALGORITHM {
            return Err(SigningError::UnsupportedAlgorithm(
                self.signature_algorithm.clone(),
            ));
        }

        let sig_bytes = base64::engine::general_purpose::STANDARD.decode(&self.signature)?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;

        Ok(verifying_key.verify(payload, &signature).is_ok())
    }

    /// Verify the signature and check the key fingerprint against a pinned value
    pub fn verify_with_pinning(
        &self,
        verifying_key: &VerifyingKey,
        payload: &[u8],
        pinned_fingerprint: Option<&str>,
    ) -> SigningResult<bool> {
        if let Some(pinned) = pinned_fingerprint {
            let actual = compute_key_fingerprint(verifying_key);
            if actual != pinned {
                return Err(SigningError::FingerprintMismatch {
                    expected: pinned.to_string(),
                    actual,
                });
            }
        }

        self.verify(verifying_key, payload)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Ed25519 signer holding the process-lifetime key
pub struct CryptoProvider {
    signing_key: SigningKey,
    key_id: String,
    key_version: String,
}

impl CryptoProvider {
    pub fn from_signing_key(
        signing_key: SigningKey,
        key_id: impl Into<String>,
        key_version: impl Into<String>,
    ) -> Self {
        Self {
            signing_key,
            key_id: key_id.into(),
            key_version: key_version.into(),
        }
    }

    /// Fresh random key, for tests and local runs
    pub fn generate(key_id: impl Into<String>, key_version: impl Into<String>) -> Self {
        Self::from_signing_key(
            SigningKey::generate(&mut rand::thread_rng()),
            key_id,
            key_version,
        )
    }

    /// Load a base64-encoded private key from a file
    pub fn from_key_file(
        path: &Path,
        key_id: impl Into<String>,
        key_version: impl Into<String>,
    ) -> SigningResult<Self> {
        let encoded = fs::read_to_string(path)?;
        let signing_key = decode_signing_key(encoded.trim())?;
        tracing::info!(
            path = %path.display(),
            fingerprint = %compute_key_fingerprint(&signing_key.verifying_key()),
            "signing key loaded"
        );
        Ok(Self::from_signing_key(signing_key, key_id, key_version))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }
}

impl fmt::Debug for CryptoProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoProvider")
            .field("key_id", &self.key_id)
            .field("key_version", &self.key_version)
            .field("fingerprint", &compute_key_fingerprint(&self.verifying_key()))
            .finish()
    }
}

impl ArchiveSigner for CryptoProvider {
    fn identity(&self) -> SignerIdentity {
        SignerIdentity {
            key_id: self.key_id.clone(),
            key_version: self.key_version.clone(),
            pubkey_fingerprint: compute_key_fingerprint(&self.verifying_key()),
        }
    }

    fn sign(&self, payload: &[u8]) -> SigningResult<Vec<u8>> {
        Ok(self.signing_key.sign(payload).to_bytes().to_vec())
    }
}

/// Compute SHA-256 fingerprint of an Ed25519 public key
pub fn compute_key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Encode a signing key to base64 for storage
pub fn encode_signing_key(key: &SigningKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.to_bytes())
}

/// Decode a signing key from base64
pub fn decode_signing_key(encoded: &str) -> SigningResult<SigningKey> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&bytes_array))
}

/// Encode a verifying key to base64 for storage
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    base64::engine::general_purpose::STANDARD.encode(key.as_bytes())
}

/// Decode a verifying key from base64
pub fn decode_verifying_key(encoded: &str) -> SigningResult<VerifyingKey> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
    let bytes_array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes_array).map_err(|e| SigningError::InvalidKey(e.to_string()))
}

/// Signature file name for a payload: `export.bin` becomes `export.sig`
pub fn signature_file_name(payload_name: &str) -> String {
    let stem = match payload_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => payload_name,
    };
    format!("{}{}", stem, SIGNATURE_SUFFIX)
}

/// Signing decorator around one archive
pub struct SignedArchive {
    archive: Archive,
    signer: Arc<dyn ArchiveSigner>,
    signature_file_name: String,
    signature: OnceLock<DetachedSignature>,
}

impl SignedArchive {
    pub fn new(
        archive: Archive,
        signer: Arc<dyn ArchiveSigner>,
        signature_file_name: impl Into<String>,
    ) -> Self {
        Self {
            archive,
            signer,
            signature_file_name: signature_file_name.into(),
            signature: OnceLock::new(),
        }
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn signature_file_name(&self) -> &str {
        &self.signature_file_name
    }

    /// The cached signature, if [`sign`](Self::sign) already ran
    pub fn signature(&self) -> Option<&DetachedSignature> {
        self.signature.get()
    }

    /// Sign the wrapped archive's bytes; computed once and cached
    pub fn sign(&self) -> Result<&DetachedSignature, StructureError> {
        if let Some(signature) = self.signature.get() {
            return Ok(signature);
        }

        if self.archive.get(&self.signature_file_name).is_some() {
            return Err(StructureError::NameCollision {
                archive: self.archive.name().to_string(),
                name: self.signature_file_name.clone(),
            });
        }

        let payload = self.archive.to_bytes()?;
        let signature =
            DetachedSignature::create(self.signer.as_ref(), &payload).map_err(|source| {
                StructureError::Signing {
                    name: self.archive.name().to_string(),
                    source,
                }
            })?;

        tracing::debug!(
            archive = %self.archive.name(),
            key_id = %signature.key_id,
            bytes = payload.len(),
            "archive signed"
        );
        Ok(self.signature.get_or_init(|| signature))
    }
}

impl fmt::Debug for SignedArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedArchive")
            .field("archive", &self.archive)
            .field("signature_file_name", &self.signature_file_name)
            .field("signed", &self.signature.get().is_some())
            .finish()
    }
}

impl Writable for SignedArchive {
    fn name(&self) -> &str {
        self.archive.name()
    }

    fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        let signature = self.sign()?;
        let document = signature.to_json().map_err(|e| StructureError::Signing {
            name: self.name().to_string(),
            source: SigningError::Json(e),
        })?;

        let mut entries = self.archive.inner_entries()?;
        entries.push(MaterializedEntry::file(
            &self.signature_file_name,
            document.into_bytes(),
        ));

        let bytes = bundle_entries(&entries).map_err(|source| StructureError::Bundle {
            name: self.name().to_string(),
            source,
        })?;
        Ok(vec![MaterializedEntry::file(self.name(), bytes)])
    }
}

/// Verify a materialized signed bundle.
///
/// Returns `Ok(false)` when the signature does not match the bundle
/// contents, and an error when the bundle is malformed or the key does not
/// match a pinned fingerprint.
pub fn verify_signed_bundle(
    bundle: &[u8],
    signature_file_name: &str,
    verifying_key: &VerifyingKey,
    pinned_fingerprint: Option<&str>,
) -> SigningResult<bool> {
    let mut entries = unbundle(bundle)?;
    let position = entries
        .iter()
        .position(|e| e.path == signature_file_name)
        .ok_or_else(|| {
            SigningError::InvalidSignature(format!("missing {}", signature_file_name))
        })?;
    let signature_entry = entries.remove(position);

    let document = String::from_utf8(signature_entry.contents)
        .map_err(|e| SigningError::InvalidSignature(e.to_string()))?;
    let signature = DetachedSignature::from_json(&document)?;

    let payload = bundle_entries(&entries)?;
    signature.verify_with_pinning(verifying_key, &payload, pinned_fingerprint)
}
