//! Built-in distribution defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Name of the root output directory (default: "v1")
    pub root_directory: String,

    /// Fallback archive/directory name (default: "index")
    pub default_archive_name: String,

    /// Payload file name inside every archive (default: "export.bin")
    pub export_binary_filename: String,

    /// Rule directory name (default: "ccl")
    pub ccl_directory_name: String,

    /// Requested rule type (default: "Acceptance")
    pub ccl_rule_type: String,

    /// Schema resource for rules (default: "dgc/ccl-configuration.json")
    pub ccl_schema_path: String,

    /// Sign archives (default: true)
    pub signing_enabled: bool,

    /// Signing key identifier (default: "262")
    pub signing_key_id: String,

    /// Signing key version (default: "v1")
    pub signing_key_version: String,

    /// Key directory name (default: "diagnosis-keys")
    pub keys_directory_name: String,

    /// Export region (default: "DE")
    pub keys_region: String,

    /// Minimum transmission risk distributed (default: 1)
    pub keys_min_transmission_risk: i32,

    /// Distribution window length in hours (default: 1)
    pub keys_window_hours: u32,

    /// How far back a build looks in hours (default: 336 = 14 days)
    pub keys_lookback_hours: u32,

    /// Retention in days (default: 14)
    pub retention_days: u32,

    /// Store path (default: "data/diagnosis-keys.db")
    pub store_path: String,

    /// Store busy timeout in milliseconds (default: 5000)
    pub store_busy_timeout_ms: u64,

    /// Log filter directive (default: "info")
    pub logging_filter: String,

    /// JSON log output (default: false)
    pub logging_json: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            root_directory: "v1".to_string(),
            default_archive_name: "index".to_string(),
            export_binary_filename: "export.bin".to_string(),
            ccl_directory_name: "ccl".to_string(),
            ccl_rule_type: "Acceptance".to_string(),
            ccl_schema_path: "dgc/ccl-configuration.json".to_string(),
            signing_enabled: true,
            signing_key_id: "262".to_string(),
            signing_key_version: "v1".to_string(),
            keys_directory_name: "diagnosis-keys".to_string(),
            keys_region: "DE".to_string(),
            keys_min_transmission_risk: 1,
            keys_window_hours: 1,
            keys_lookback_hours: 336,
            retention_days: 14,
            store_path: "data/diagnosis-keys.db".to_string(),
            store_busy_timeout_ms: 5000,
            logging_filter: "info".to_string(),
            logging_json: false,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "root_directory": self.root_directory,
            "default_archive_name": self.default_archive_name,
            "export_binary_filename": self.export_binary_filename,
            "ccl": {
                "directory_name": self.ccl_directory_name,
                "allow_list": [],
                "rule_type": self.ccl_rule_type,
                "schema_path": self.ccl_schema_path
            },
            "signing": {
                "enabled": self.signing_enabled,
                "key_id": self.signing_key_id,
                "key_version": self.signing_key_version
            },
            "keys": {
                "directory_name": self.keys_directory_name,
                "region": self.keys_region,
                "min_transmission_risk": self.keys_min_transmission_risk,
                "window_hours": self.keys_window_hours,
                "lookback_hours": self.keys_lookback_hours
            },
            "retention": {
                "retention_days": self.retention_days
            },
            "store": {
                "path": self.store_path,
                "busy_timeout_ms": self.store_busy_timeout_ms
            },
            "logging": {
                "filter": self.logging_filter,
                "json": self.logging_json
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.export_binary_filename, "export.bin");
        assert_eq!(defaults.ccl_schema_path, "dgc/ccl-configuration.json");
        assert_eq!(defaults.keys_window_hours, 1);
        assert_eq!(defaults.retention_days, 14);
        assert!(defaults.signing_enabled);
    }

    #[test]
    fn test_to_value() {
        let value = BuiltinDefaults::default().to_value();

        assert_eq!(value["ccl"]["rule_type"], "Acceptance");
        assert_eq!(value["keys"]["lookback_hours"], 336);
        assert_eq!(value["store"]["busy_timeout_ms"], 5000);
        assert!(value["ccl"]["allow_list"].as_array().unwrap().is_empty());
    }
}
