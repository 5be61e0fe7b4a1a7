//! Business rule records
//!
//! Rules are exchanged as JSON with PascalCase field names. The rule logic is
//! opaque to this crate and carried through unchanged.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of rule a build distributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleType {
    Acceptance,
    Invalidation,
    BoosterNotification,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Acceptance => "Acceptance",
            RuleType::Invalidation => "Invalidation",
            RuleType::BoosterNotification => "BoosterNotification",
        }
    }

    /// Case-insensitive comparison against a rule's declared type
    pub fn matches(&self, declared: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(declared)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            RuleType::Acceptance,
            RuleType::Invalidation,
            RuleType::BoosterNotification,
        ]
        .into_iter()
        .find(|t| t.matches(s))
        .ok_or_else(|| format!("unknown rule type '{}'", s))
    }
}

/// Lightweight pointer to a rule, used to decide whether to fetch it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BusinessRuleSummary {
    pub identifier: String,
    pub country: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_fields: Vec<String>,
}

impl BusinessRuleSummary {
    pub fn new(
        identifier: impl Into<String>,
        country: impl Into<String>,
        hash: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            country: country.into(),
            hash: hash.into(),
            version: None,
            affected_fields: Vec::new(),
        }
    }
}

/// A full business rule as fetched from the rule source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BusinessRule {
    pub identifier: String,
    /// Declared type, compared case-insensitively against [`RuleType`]
    #[serde(rename = "Type")]
    pub rule_type: String,
    pub country: String,
    pub version: u32,
    pub hash: String,
    pub logic: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl BusinessRule {
    /// Minimal rule; descriptive fields start empty
    pub fn new(
        identifier: impl Into<String>,
        rule_type: impl Into<String>,
        country: impl Into<String>,
        version: u32,
        hash: impl Into<String>,
        logic: Value,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            rule_type: rule_type.into(),
            country: country.into(),
            version,
            hash: hash.into(),
            logic,
            engine: None,
            engine_version: None,
            schema_version: None,
            valid_from: None,
            valid_to: None,
            description: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_type_matches_case_insensitively() {
        assert!(RuleType::BoosterNotification.matches("boosternotification"));
        assert!(RuleType::Acceptance.matches("ACCEPTANCE"));
        assert!(!RuleType::Acceptance.matches("Invalidation"));
        assert_eq!("invalidation".parse::<RuleType>(), Ok(RuleType::Invalidation));
        assert!("Booster".parse::<RuleType>().is_err());
    }

    #[test]
    fn test_rule_json_field_names() {
        let rule = BusinessRule::new("CCL-DE-0001", "Acceptance", "DE", 2, "abc", json!({"and": []}));
        let value = serde_json::to_value(&rule).unwrap();

        assert_eq!(value["Identifier"], "CCL-DE-0001");
        assert_eq!(value["Type"], "Acceptance");
        assert_eq!(value["Version"], 2);
        assert!(value.get("Engine").is_none());
    }

    #[test]
    fn test_summary_parses_with_optional_fields() {
        let summary: BusinessRuleSummary = serde_json::from_value(json!({
            "Identifier": "CCL-DE-0001",
            "Country": "DE",
            "Hash": "abc",
            "Version": "1.0.0"
        }))
        .unwrap();
        assert_eq!(summary.version.as_deref(), Some("1.0.0"));
        assert!(summary.affected_fields.is_empty());
    }
}
