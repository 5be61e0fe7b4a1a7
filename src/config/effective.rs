//! Effective configuration with provenance
//!
//! Captures the merged configuration plus where each layer came from, and
//! converts the merged value into the typed [`DistributionConfig`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use super::settings::DistributionConfig;

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Override,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/override)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Keys whose values are masked in the redacted view
const SECRET_KEYS: &[&str] = &["password", "token", "secret", "private_key", "credential"];

/// Merged configuration and the sources that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Merge built-in defaults, an optional TOML file and optional overrides
    pub fn build(config_path: Option<&Path>, overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(value) = overrides {
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Override,
                path: None,
                digest: None,
            });
        }

        Ok(Self {
            config: merge_layers(layers),
            sources,
        })
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((toml_to_json(toml_value), digest))
    }

    /// Deserialize and validate the typed configuration
    pub fn settings(&self) -> Result<DistributionConfig, ConfigError> {
        let config: DistributionConfig = serde_json::from_value(self.config.clone())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;

        let (redacted, redactions) = self.redacted();
        tracing::info!(
            config = %redacted,
            sources = self.sources.len(),
            redacted_keys = ?redactions,
            "effective configuration"
        );
        Ok(config)
    }

    /// Copy of the merged configuration with secret-looking values masked,
    /// together with the masked key paths
    pub fn redacted(&self) -> (Value, Vec<String>) {
        let mut value = self.config.clone();
        let mut redactions = Vec::new();
        redact_recursive(&mut value, String::new(), &mut redactions);
        (value, redactions)
    }
}

fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

fn redact_recursive(value: &mut Value, path: String, redactions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let current_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };

                let key_lower = key.to_lowercase();
                let is_secret = SECRET_KEYS.iter().any(|s| key_lower.contains(s));

                if is_secret && !val.is_object() && !val.is_array() {
                    *val = Value::String("[REDACTED]".to_string());
                    redactions.push(current_path);
                } else {
                    redact_recursive(val, current_path, redactions);
                }
            }
        }
        Value::Array(arr) => {
            for (i, val) in arr.iter_mut().enumerate() {
                redact_recursive(val, format!("{}[{}]", path, i), redactions);
            }
        }
        _ => {}
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None).unwrap();

        assert_eq!(config.config["export_binary_filename"], "export.bin");
        assert_eq!(config.config["keys"]["window_hours"], 1);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_file_then_override_precedence() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "root_directory = \"v2\"").unwrap();
        writeln!(temp, "[keys]").unwrap();
        writeln!(temp, "window_hours = 6").unwrap();
        writeln!(temp, "region = \"AT\"").unwrap();

        let overrides = serde_json::json!({"keys": {"window_hours": 24}});
        let config = EffectiveConfig::build(Some(temp.path()), Some(overrides)).unwrap();

        assert_eq!(config.config["root_directory"], "v2");
        assert_eq!(config.config["keys"]["region"], "AT");
        assert_eq!(config.config["keys"]["window_hours"], 24);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::File);
        assert_eq!(config.sources[1].digest.as_ref().map(String::len), Some(64));
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = EffectiveConfig::build(Some(Path::new("/nonexistent/enx.toml")), None);
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let mut temp = NamedTempFile::new().unwrap();
        writeln!(temp, "[keys").unwrap();
        let result = EffectiveConfig::build(Some(temp.path()), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_redacted_view_masks_secrets_only() {
        let overrides = serde_json::json!({
            "signing": {"private_key": "c2VjcmV0", "key_id": "262"}
        });
        let config = EffectiveConfig::build(None, Some(overrides)).unwrap();
        let (redacted, paths) = config.redacted();

        assert_eq!(redacted["signing"]["private_key"], "[REDACTED]");
        assert_eq!(redacted["signing"]["key_id"], "262");
        assert_eq!(paths, vec!["signing.private_key".to_string()]);
        // The merged value itself is untouched
        assert_eq!(config.config["signing"]["private_key"], "c2VjcmV0");
    }

    #[test]
    fn test_settings_from_defaults() {
        let settings = EffectiveConfig::build(None, None).unwrap().settings().unwrap();
        assert_eq!(settings.keys.region, "DE");
        assert_eq!(settings.ccl.schema_path, "dgc/ccl-configuration.json");
    }

    #[test]
    fn test_settings_rejects_invalid_window() {
        let overrides = serde_json::json!({"keys": {"window_hours": 5}});
        let result = EffectiveConfig::build(None, Some(overrides)).unwrap().settings();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
