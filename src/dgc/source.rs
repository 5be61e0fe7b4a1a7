//! Rule source contract
//!
//! The upstream rule service is reached through [`RuleSource`]. Transport,
//! caching and retries belong to the implementation, not to the builder.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use thiserror::Error;

use super::rule::{BusinessRule, BusinessRuleSummary};

/// Failure to obtain rules from the upstream source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("rule catalog unavailable: {0}")]
    Catalog(String),

    #[error("rule {country}/{hash} unavailable: {message}")]
    Rule {
        country: String,
        hash: String,
        message: String,
    },
}

/// Upstream supplier of rule summaries and full rules
pub trait RuleSource: Send + Sync {
    /// All rule summaries currently published
    fn summaries(&self) -> Result<Vec<BusinessRuleSummary>, FetchError>;

    /// Full rule for a country and content hash
    fn rule(&self, country: &str, hash: &str) -> Result<BusinessRule, FetchError>;
}

/// In-memory rule source, recording every per-rule fetch
#[derive(Debug, Default)]
pub struct InMemoryRuleSource {
    summaries: Vec<BusinessRuleSummary>,
    rules: HashMap<(String, String), BusinessRule>,
    failing: HashSet<(String, String)>,
    catalog_error: Option<String>,
    fetched: Mutex<Vec<(String, String)>>,
}

impl InMemoryRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a rule under `identifier`
    pub fn with_rule(mut self, identifier: impl Into<String>, rule: BusinessRule) -> Self {
        let summary = BusinessRuleSummary::new(identifier, &rule.country, &rule.hash);
        self.rules
            .insert((rule.country.clone(), rule.hash.clone()), rule);
        self.summaries.push(summary);
        self
    }

    /// Publish a summary whose full rule fails to fetch
    pub fn with_failing_rule(mut self, summary: BusinessRuleSummary) -> Self {
        self.failing
            .insert((summary.country.clone(), summary.hash.clone()));
        self.summaries.push(summary);
        self
    }

    /// Make the catalog itself fail
    pub fn with_catalog_error(mut self, message: impl Into<String>) -> Self {
        self.catalog_error = Some(message.into());
        self
    }

    /// `(country, hash)` pairs requested through [`RuleSource::rule`], in order
    pub fn fetched(&self) -> Vec<(String, String)> {
        self.fetched
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }
}

impl RuleSource for InMemoryRuleSource {
    fn summaries(&self) -> Result<Vec<BusinessRuleSummary>, FetchError> {
        match &self.catalog_error {
            Some(message) => Err(FetchError::Catalog(message.clone())),
            None => Ok(self.summaries.clone()),
        }
    }

    fn rule(&self, country: &str, hash: &str) -> Result<BusinessRule, FetchError> {
        let key = (country.to_string(), hash.to_string());
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(key.clone());
        }

        let unavailable = |message: &str| FetchError::Rule {
            country: country.to_string(),
            hash: hash.to_string(),
            message: message.to_string(),
        };

        if self.failing.contains(&key) {
            return Err(unavailable("upstream error"));
        }
        self.rules
            .get(&key)
            .cloned()
            .ok_or_else(|| unavailable("not found"))
    }
}
