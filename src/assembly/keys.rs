//! Diagnosis key archive assembly
//!
//! Keys inside the lookback period are grouped into fixed distribution
//! windows. Every closed window becomes an `hour-HH` archive inside a
//! `YYYY-MM-DD` directory. The window containing `now` is still filling and
//! is never published.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use enx_persistence::{hours_since_epoch, DiagnosisKey, RecordStore};

use crate::encode::{Encoder, KeyExportEncoder};
use crate::structure::{ArchiveSigner, Directory, WritableNode};

use super::collector::{default_workers, run_partitions, seal, PartitionError};
use super::partition::partition_by;
use super::report::{BuildError, BuildFailure, BuildReport, BuildStage, BuildStats};

/// A distribution window of whole hours, aligned to midnight UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DistributionWindow {
    /// First hour of the window, hours since epoch
    pub start_hour: i64,
    pub hours: u32,
}

impl DistributionWindow {
    /// The window of `hours` length containing `hour`
    pub fn containing(hour: i64, hours: u32) -> Self {
        let hours = hours.max(1);
        Self {
            start_hour: hour - hour.rem_euclid(i64::from(hours)),
            hours,
        }
    }

    /// First hour after the window
    pub fn end_hour(&self) -> i64 {
        self.start_hour + i64::from(self.hours)
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.start_hour * 3600, 0)
    }

    /// Directory name, `YYYY-MM-DD`
    pub fn date_name(&self) -> Option<String> {
        self.start().map(|t| t.format("%Y-%m-%d").to_string())
    }

    /// Archive name, `hour-HH`
    pub fn archive_name(&self) -> Option<String> {
        self.start().map(|t| t.format("hour-%H").to_string())
    }
}

/// Builds the diagnosis key directory
pub struct KeyArchiveBuilder {
    store: Arc<RecordStore>,
    directory_name: String,
    region: String,
    min_transmission_risk: i32,
    window_hours: u32,
    lookback_hours: u32,
    export_binary_filename: String,
    signer: Option<Arc<dyn ArchiveSigner>>,
    workers: usize,
}

impl KeyArchiveBuilder {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self {
            store,
            directory_name: "diagnosis-keys".to_string(),
            region: "DE".to_string(),
            min_transmission_risk: 1,
            window_hours: 1,
            lookback_hours: 14 * 24,
            export_binary_filename: "export.bin".to_string(),
            signer: None,
            workers: default_workers(),
        }
    }

    pub fn with_directory_name(mut self, name: impl Into<String>) -> Self {
        self.directory_name = name.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_min_transmission_risk(mut self, risk: i32) -> Self {
        self.min_transmission_risk = risk;
        self
    }

    pub fn with_window_hours(mut self, hours: u32) -> Self {
        self.window_hours = hours;
        self
    }

    pub fn with_lookback_hours(mut self, hours: u32) -> Self {
        self.lookback_hours = hours;
        self
    }

    pub fn with_export_binary_filename(mut self, filename: impl Into<String>) -> Self {
        self.export_binary_filename = filename.into();
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

    /// Assemble every closed window inside the lookback period
    pub fn build(&self, now: DateTime<Utc>) -> Result<BuildReport, BuildError> {
        if self.window_hours == 0 || 24 % self.window_hours != 0 {
            return Err(BuildError::Configuration(format!(
                "window_hours must divide 24, got {}",
                self.window_hours
            )));
        }

        let current_hour = hours_since_epoch(now);
        let since = current_hour - i64::from(self.lookback_hours);
        let keys = self
            .store
            .query_by_risk_and_time(self.min_transmission_risk, since)
            .map_err(|e| {
                tracing::error!(error = %e, "diagnosis keys could not be read");
                e
            })?;

        let mut stats = BuildStats {
            candidates: keys.len(),
            ..BuildStats::default()
        };

        let window_hours = self.window_hours;
        let mut partitions = partition_by(keys, |key: &DiagnosisKey| {
            DistributionWindow::containing(key.submission_timestamp, window_hours)
        });
        let open = partitions.split_off(&DistributionWindow::containing(current_hour, window_hours));
        stats.skipped = open.values().map(Vec::len).sum();
        stats.accepted = stats.candidates - stats.skipped;
        stats.partitions = partitions.len();

        let results = run_partitions(partitions, self.workers, |window, keys| {
            self.assemble_window(window, &keys)
        });

        let mut directory = Directory::new(&self.directory_name);
        let mut failures = Vec::new();
        for (window, result) in results {
            match result {
                Ok((date, node)) => {
                    directory.ensure_directory(&date).add(node);
                    stats.archives += 1;
                }
                Err(e) => {
                    tracing::error!(
                        window_start = window.start_hour,
                        stage = %e.stage,
                        error = %e.message,
                        "key archive was not written"
                    );
                    let subject = match (window.date_name(), window.archive_name()) {
                        (Some(date), Some(archive)) => format!("{}/{}", date, archive),
                        _ => format!("window@{}", window.start_hour),
                    };
                    failures.push(BuildFailure::new(e.stage, subject, e.message));
                }
            }
        }

        tracing::info!(
            directory = %self.directory_name,
            candidates = stats.candidates,
            open_window = stats.skipped,
            archives = stats.archives,
            failures = failures.len(),
            "diagnosis key archives assembled"
        );
        Ok(BuildReport {
            directory,
            failures,
            stats,
        })
    }

    fn assemble_window(
        &self,
        window: &DistributionWindow,
        keys: &[DiagnosisKey],
    ) -> Result<(String, WritableNode), PartitionError> {
        let (date, archive_name) = match (window.date_name(), window.archive_name()) {
            (Some(date), Some(archive)) => (date, archive),
            _ => {
                return Err(PartitionError {
                    stage: BuildStage::Assemble,
                    message: format!("window start hour {} out of range", window.start_hour),
                })
            }
        };

        let encoder = KeyExportEncoder::new(
            &self.region,
            window.start_hour * 3600,
            window.end_hour() * 3600,
        );
        let payload = encoder.encode(keys)?;
        let node = seal(
            archive_name,
            &self.export_binary_filename,
            payload,
            self.signer.as_ref(),
        )?;
        Ok((date, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_alignment() {
        // 2020-07-15T10:00Z
        let hour = hours_since_epoch(Utc.with_ymd_and_hms(2020, 7, 15, 10, 0, 0).unwrap());

        let hourly = DistributionWindow::containing(hour, 1);
        assert_eq!(hourly.start_hour, hour);
        assert_eq!(hourly.archive_name().as_deref(), Some("hour-10"));
        assert_eq!(hourly.date_name().as_deref(), Some("2020-07-15"));

        let six = DistributionWindow::containing(hour + 1, 6);
        assert_eq!(six.archive_name().as_deref(), Some("hour-06"));
        assert_eq!(six.end_hour() - six.start_hour, 6);

        let daily = DistributionWindow::containing(hour, 24);
        assert_eq!(daily.archive_name().as_deref(), Some("hour-00"));
    }

    #[test]
    fn test_rejects_window_not_dividing_day() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let result = KeyArchiveBuilder::new(store)
            .with_window_hours(5)
            .build(Utc::now());
        assert!(matches!(result, Err(BuildError::Configuration(_))));
    }
}
