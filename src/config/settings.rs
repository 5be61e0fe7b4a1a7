//! Typed distribution configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::effective::ConfigError;
use crate::dgc::RuleType;

/// Complete configuration for a distribution run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub root_directory: String,
    pub default_archive_name: String,
    pub export_binary_filename: String,
    pub ccl: CclConfig,
    pub signing: SigningConfig,
    pub keys: KeyDistributionConfig,
    pub retention: RetentionConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

/// Common covid logic rule archives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CclConfig {
    pub directory_name: String,
    /// Rule identifiers eligible for distribution
    #[serde(default)]
    pub allow_list: Vec<String>,
    pub rule_type: String,
    pub schema_path: String,
}

impl CclConfig {
    /// The configured rule type, matched case-insensitively
    pub fn rule_type(&self) -> Result<RuleType, ConfigError> {
        self.rule_type
            .parse()
            .map_err(|e: String| ConfigError::ValidationError(format!("ccl.rule_type: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub enabled: bool,
    /// Base64 Ed25519 private key file
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    pub key_id: String,
    pub key_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDistributionConfig {
    pub directory_name: String,
    pub region: String,
    pub min_transmission_risk: i32,
    /// Hours per distribution window; divides 24
    pub window_hours: u32,
    pub lookback_hours: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    pub retention_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl DistributionConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.export_binary_filename.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "export_binary_filename must not be empty".to_string(),
            ));
        }

        if self.root_directory.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "root_directory must not be empty".to_string(),
            ));
        }

        let window = self.keys.window_hours;
        if window == 0 || window > 24 || 24 % window != 0 {
            return Err(ConfigError::ValidationError(format!(
                "keys.window_hours must divide 24, got {}",
                window
            )));
        }

        if !(1..=8).contains(&self.keys.min_transmission_risk) {
            return Err(ConfigError::ValidationError(
                "keys.min_transmission_risk must be in [1, 8]".to_string(),
            ));
        }

        self.ccl.rule_type()?;

        if self.retention.retention_days == 0 {
            return Err(ConfigError::ValidationError(
                "retention.retention_days must be at least 1".to_string(),
            ));
        }

        if self.signing.enabled && self.signing.key_id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "signing.key_id must be set when signing is enabled".to_string(),
            ));
        }

        Ok(())
    }
}
