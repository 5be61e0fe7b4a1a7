//! Rule archive assembly
//!
//! Fetches the rule catalog, keeps allow-listed rules of the requested type
//! that pass schema validation, groups them by version and publishes one
//! (optionally signed) `config-v{version}` archive per version.

use std::collections::HashSet;
use std::sync::Arc;

use crate::dgc::{BusinessRule, RuleSource, RuleType, SchemaValidator, CCL_JSON_SCHEMA};
use crate::encode::{CborEncoder, Encoder};
use crate::structure::{ArchiveSigner, Directory};

use super::collector::{default_workers, run_partitions, seal};
use super::partition::partition_by_version;
use super::report::{BuildError, BuildFailure, BuildReport, BuildStage, BuildStats};

/// Archive name prefix; the rule version is appended
pub const CONFIG_V: &str = "config-v";

/// Builds the rule archive directory
pub struct RuleArchiveBuilder {
    source: Arc<dyn RuleSource>,
    validator: Arc<SchemaValidator>,
    allow_list: HashSet<String>,
    default_archive_name: String,
    directory_name: Option<String>,
    rule_type: RuleType,
    export_binary_filename: String,
    schema_path: String,
    signer: Option<Arc<dyn ArchiveSigner>>,
    workers: usize,
}

impl RuleArchiveBuilder {
    pub fn new<I, S>(source: Arc<dyn RuleSource>, validator: Arc<SchemaValidator>, allow_list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source,
            validator,
            allow_list: allow_list.into_iter().map(Into::into).collect(),
            default_archive_name: "index".to_string(),
            directory_name: None,
            rule_type: RuleType::Acceptance,
            export_binary_filename: "export.bin".to_string(),
            schema_path: CCL_JSON_SCHEMA.to_string(),
            signer: None,
            workers: default_workers(),
        }
    }

    pub fn with_directory_name(mut self, name: impl Into<String>) -> Self {
        self.directory_name = Some(name.into());
        self
    }

    /// Name used when no (or an empty) directory name is set
    pub fn with_default_archive_name(mut self, name: impl Into<String>) -> Self {
        self.default_archive_name = name.into();
        self
    }

    pub fn with_rule_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    pub fn with_export_binary_filename(mut self, filename: impl Into<String>) -> Self {
        self.export_binary_filename = filename.into();
        self
    }

    pub fn with_schema_path(mut self, path: impl Into<String>) -> Self {
        self.schema_path = path.into();
        self
    }

    pub fn with_signer(mut self, signer: Arc<dyn ArchiveSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    fn output_directory_name(&self) -> &str {
        match self.directory_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.default_archive_name,
        }
    }

    /// Run the build.
    ///
    /// Only an unavailable rule catalog fails the build; every other
    /// problem drops the affected rule or version and is recorded in the
    /// report.
    pub fn build(&self) -> Result<BuildReport, BuildError> {
        let mut failures = Vec::new();
        let mut stats = BuildStats::default();

        let summaries = self.source.summaries().map_err(|e| {
            tracing::error!(error = %e, "rule catalog could not be fetched");
            e
        })?;

        let allowed: Vec<_> = summaries
            .into_iter()
            .filter(|s| self.allow_list.contains(&s.identifier))
            .collect();
        stats.candidates = allowed.len();

        let mut rules: Vec<BusinessRule> = Vec::new();
        for summary in allowed {
            let rule = match self.source.rule(&summary.country, &summary.hash) {
                Ok(rule) => rule,
                Err(e) => {
                    tracing::warn!(
                        identifier = %summary.identifier,
                        country = %summary.country,
                        hash = %summary.hash,
                        error = %e,
                        "business rule could not be fetched"
                    );
                    failures.push(BuildFailure::new(
                        BuildStage::Fetch,
                        format!("{}/{}", summary.country, summary.hash),
                        e,
                    ));
                    continue;
                }
            };

            if !self.rule_type.matches(&rule.rule_type) {
                stats.skipped += 1;
                continue;
            }

            if let Err(e) = self.validator.validate(&rule, &self.schema_path) {
                tracing::warn!(
                    identifier = %rule.identifier,
                    country = %rule.country,
                    hash = %rule.hash,
                    error = %e,
                    "business rule is not valid"
                );
                failures.push(BuildFailure::new(BuildStage::Validate, &rule.identifier, e));
                continue;
            }

            rules.push(rule);
        }
        stats.accepted = rules.len();

        let partitions = partition_by_version(rules);
        stats.partitions = partitions.len();

        let results = run_partitions(partitions, self.workers, |version, rules| {
            let payload = CborEncoder.encode(rules.as_slice())?;
            seal(
                format!("{}{}", CONFIG_V, version),
                &self.export_binary_filename,
                payload,
                self.signer.as_ref(),
            )
        });

        let mut directory = Directory::new(self.output_directory_name());
        for (version, result) in results {
            let archive_name = format!("{}{}", CONFIG_V, version);
            match result {
                Ok(node) => {
                    directory.add(node);
                    stats.archives += 1;
                }
                Err(e) => {
                    tracing::error!(
                        archive = %archive_name,
                        stage = %e.stage,
                        error = %e.message,
                        "archive was not written"
                    );
                    failures.push(BuildFailure::new(e.stage, archive_name, e.message));
                }
            }
        }

        tracing::info!(
            rule_type = %self.rule_type,
            directory = %self.output_directory_name(),
            candidates = stats.candidates,
            accepted = stats.accepted,
            archives = stats.archives,
            failures = failures.len(),
            "rule archives assembled"
        );
        Ok(BuildReport {
            directory,
            failures,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dgc::{InMemoryRuleSource, StaticResourceLoader};
    use crate::structure::{Writable, WritableNode};
    use serde_json::json;

    fn validator() -> Arc<SchemaValidator> {
        let schema = json!({"type": "object", "required": ["Identifier", "Logic"]}).to_string();
        Arc::new(SchemaValidator::new(Arc::new(
            StaticResourceLoader::new().with_resource(CCL_JSON_SCHEMA, schema),
        )))
    }

    fn rule(hash: &str, rule_type: &str, version: u32) -> BusinessRule {
        BusinessRule::new("CCL-DE-0001", rule_type, "DE", version, hash, json!({"var": "x"}))
    }

    #[test]
    fn test_empty_directory_name_falls_back() {
        let source = Arc::new(InMemoryRuleSource::new());
        let report = RuleArchiveBuilder::new(source, validator(), ["CCL-DE-0001"])
            .with_directory_name("  ")
            .with_default_archive_name("fallback")
            .build()
            .unwrap();

        assert_eq!(report.directory.name(), "fallback");
        assert!(report.directory.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_other_rule_types_skipped() {
        let source = Arc::new(
            InMemoryRuleSource::new()
                .with_rule("CCL-DE-0001", rule("a", "acceptance", 1))
                .with_rule("CCL-DE-0001", rule("b", "Invalidation", 1)),
        );
        let report = RuleArchiveBuilder::new(source, validator(), ["CCL-DE-0001"])
            .with_directory_name("ccl")
            .build()
            .unwrap();

        assert_eq!(report.stats.accepted, 1);
        assert_eq!(report.stats.skipped, 1);
        assert!(report.is_clean());
        assert!(matches!(
            report.directory.get("config-v1"),
            Some(WritableNode::Archive(_))
        ));
    }
}
