//! Archive assembly pipelines
//!
//! Both builders follow the same stage shape: read from a source, filter,
//! partition, then encode, archive and sign every partition in parallel
//! before a single collector assembles the output directory.

mod collector;
mod keys;
mod partition;
mod report;
mod rules;

pub use collector::{default_workers, run_partitions, seal, PartitionError};
pub use keys::{DistributionWindow, KeyArchiveBuilder};
pub use partition::{partition_by, partition_by_version};
pub use report::{BuildError, BuildFailure, BuildReport, BuildStage, BuildStats};
pub use rules::{RuleArchiveBuilder, CONFIG_V};
