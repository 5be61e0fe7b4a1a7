//! Build outcomes
//!
//! Item and partition failures never abort a build; they are collected into
//! the [`BuildReport`]. Only failures at the batch boundary surface as
//! [`BuildError`].

use std::fmt;

use enx_persistence::StorageError;
use serde::Serialize;
use thiserror::Error;

use crate::dgc::FetchError;
use crate::structure::Directory;

/// Pipeline stage at which an item or partition was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Fetch,
    Validate,
    Encode,
    Assemble,
    Sign,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Fetch => "fetch",
            BuildStage::Validate => "validate",
            BuildStage::Encode => "encode",
            BuildStage::Assemble => "assemble",
            BuildStage::Sign => "sign",
        };
        f.write_str(name)
    }
}

/// A dropped item or partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildFailure {
    pub stage: BuildStage,
    /// Rule identifier, `country/hash` pair or archive name
    pub subject: String,
    pub message: String,
}

impl BuildFailure {
    pub fn new(stage: BuildStage, subject: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            stage,
            subject: subject.into(),
            message: message.to_string(),
        }
    }
}

/// Counters collected during one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    /// Items considered after source-side filtering
    pub candidates: usize,
    /// Items skipped without being a failure (other rule type, open window)
    pub skipped: usize,
    /// Items that reached partitioning
    pub accepted: usize,
    pub partitions: usize,
    /// Archives added to the output directory
    pub archives: usize,
}

/// Result of one build
#[derive(Debug)]
pub struct BuildReport {
    pub directory: Directory,
    pub failures: Vec<BuildFailure>,
    pub stats: BuildStats,
}

impl BuildReport {
    /// True when nothing was dropped
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures_at(&self, stage: BuildStage) -> impl Iterator<Item = &BuildFailure> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

/// Failure at the batch boundary; no output is produced
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("fetching rule summaries failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("reading diagnosis keys failed: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid build configuration: {0}")]
    Configuration(String),
}
