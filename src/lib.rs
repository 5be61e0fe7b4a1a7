//! ENX Distribution - signed archive assembly for exposure notification
//!
//! This crate turns stored diagnosis keys and downloadable business rules
//! into a hierarchical tree of versioned, signed archives ready to be laid
//! out on disk by an external writer.

pub mod assembly;
pub mod config;
pub mod dgc;
pub mod encode;
pub mod service;
pub mod structure;
pub mod telemetry;

pub use assembly::{
    BuildError, BuildFailure, BuildReport, BuildStage, KeyArchiveBuilder, RuleArchiveBuilder,
};
pub use config::{DistributionConfig, EffectiveConfig};
pub use dgc::{BusinessRule, BusinessRuleSummary, RuleSource, RuleType, SchemaValidator};
pub use service::{DistributionOutput, DistributionService, ServiceError};
pub use structure::{
    Archive, CryptoProvider, Directory, File, MaterializedEntry, SignedArchive, Writable,
    WritableNode,
};

pub use enx_persistence as persistence;
