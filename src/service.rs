//! Distribution run orchestration
//!
//! One run sweeps expired keys, then assembles the diagnosis key and rule
//! directories under the configured root directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use enx_persistence::{RecordStore, RetentionOutcome, RetentionPolicy, StorageError};
use thiserror::Error;

use crate::assembly::{
    BuildError, BuildFailure, BuildStats, KeyArchiveBuilder, RuleArchiveBuilder,
};
use crate::config::{ConfigError, DistributionConfig};
use crate::dgc::{ResourceLoader, RuleSource, SchemaValidator};
use crate::structure::{
    ArchiveSigner, CryptoProvider, Directory, MaterializedEntry, SigningError, StructureError,
    Writable,
};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("signing key error: {0}")]
    Signing(#[from] SigningError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),
}

/// Output of one distribution run
#[derive(Debug)]
pub struct DistributionOutput {
    pub root: Directory,
    pub retention: RetentionOutcome,
    pub key_stats: BuildStats,
    pub rule_stats: BuildStats,
    pub failures: Vec<BuildFailure>,
}

impl DistributionOutput {
    /// Entries for the external writer
    pub fn materialize(&self) -> Result<Vec<MaterializedEntry>, StructureError> {
        self.root.materialize()
    }
}

/// Wires configuration, store, rule source and signer into one run
pub struct DistributionService {
    config: DistributionConfig,
    store: Arc<RecordStore>,
    rules: Arc<dyn RuleSource>,
    validator: Arc<SchemaValidator>,
    signer: Option<Arc<dyn ArchiveSigner>>,
}

impl DistributionService {
    /// Service without a signer; see [`with_signer`](Self::with_signer).
    /// A signing-enabled configuration needs one before [`run`](Self::run).
    pub fn new(
        config: DistributionConfig,
        store: Arc<RecordStore>,
        rules: Arc<dyn RuleSource>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        Self {
            config,
            store,
            rules,
            validator: Arc::new(SchemaValidator::new(loader)),
            signer: None,
        }
    }

    /// Open the configured store and load the configured signing key
    pub fn from_config(
        config: DistributionConfig,
        rules: Arc<dyn RuleSource>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Result<Self, ServiceError> {
        config.validate()?;
        let signer = load_signer(&config)?;
        let store = Arc::new(RecordStore::open(
            &config.store.path,
            config.store.busy_timeout(),
        )?);

        let mut service = Self::new(config, store, rules, loader);
        service.signer = signer;
        Ok(service)
    }

    pub fn with_signer(mut self, signer: Arc<dyn ArchiveSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// Sweep expired keys, then assemble both distribution directories.
    ///
    /// Refuses to run when signing is enabled but no signer is attached.
    pub fn run(&self, now: DateTime<Utc>) -> Result<DistributionOutput, ServiceError> {
        let config = &self.config;
        if config.signing.enabled && self.signer.is_none() {
            return Err(ConfigError::ValidationError(
                "signing is enabled but no signer is attached".into(),
            )
            .into());
        }

        let retention =
            RetentionPolicy::keep_days(config.retention.retention_days).apply(&self.store, now)?;

        let mut keys = KeyArchiveBuilder::new(Arc::clone(&self.store))
            .with_directory_name(&config.keys.directory_name)
            .with_region(&config.keys.region)
            .with_min_transmission_risk(config.keys.min_transmission_risk)
            .with_window_hours(config.keys.window_hours)
            .with_lookback_hours(config.keys.lookback_hours)
            .with_export_binary_filename(&config.export_binary_filename);

        let mut rules = RuleArchiveBuilder::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.validator),
            config.ccl.allow_list.iter().cloned(),
        )
        .with_directory_name(&config.ccl.directory_name)
        .with_default_archive_name(&config.default_archive_name)
        .with_rule_type(config.ccl.rule_type()?)
        .with_export_binary_filename(&config.export_binary_filename)
        .with_schema_path(&config.ccl.schema_path);

        if let Some(signer) = &self.signer {
            keys = keys.with_signer(Arc::clone(signer));
            rules = rules.with_signer(Arc::clone(signer));
        }

        let key_report = keys.build(now)?;
        let rule_report = rules.build()?;

        let mut failures = key_report.failures;
        failures.extend(rule_report.failures);

        let mut root = Directory::new(&config.root_directory);
        root.add(key_report.directory);
        root.add(rule_report.directory);

        tracing::info!(
            root = %config.root_directory,
            expired = retention.deleted,
            key_archives = key_report.stats.archives,
            rule_archives = rule_report.stats.archives,
            failures = failures.len(),
            signed = self.signer.is_some(),
            "distribution run complete"
        );

        Ok(DistributionOutput {
            root,
            retention,
            key_stats: key_report.stats,
            rule_stats: rule_report.stats,
            failures,
        })
    }
}

/// Signer described by the configuration, if signing is enabled
pub fn load_signer(
    config: &DistributionConfig,
) -> Result<Option<Arc<dyn ArchiveSigner>>, ServiceError> {
    if !config.signing.enabled {
        tracing::warn!("signing disabled; archives will be published unsigned");
        return Ok(None);
    }

    let key_file = config.signing.key_file.as_ref().ok_or_else(|| {
        ConfigError::ValidationError("signing.key_file must be set when signing is enabled".into())
    })?;
    let provider = CryptoProvider::from_key_file(
        key_file,
        &config.signing.key_id,
        &config.signing.key_version,
    )?;
    let signer: Arc<dyn ArchiveSigner> = Arc::new(provider);
    Ok(Some(signer))
}
