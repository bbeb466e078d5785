//! Ingestion stage: plan, download, consolidate, record.

use super::config::DataIngestionConfig;
use super::downloader::{DownloadRequest, Downloader, WriteOutcome};
use super::error::IngestError;
use super::feature_store::{AppendOutcome, FeatureStore};
use super::interval::IntervalPlanner;
use super::metadata::IngestionMetadataStore;
use super::transport::{Sleeper, Transport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Output of the ingestion stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIngestionArtifact {
    pub feature_store_path: PathBuf,
    pub download_dir: PathBuf,
    pub metadata_file_path: PathBuf,
}

/// Summary of one download pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub gave_up: usize,
    pub records: usize,
}

/// Summary of one consolidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationSummary {
    pub shards: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub empty: usize,
    pub rows: usize,
}

pub struct DataIngestion {
    config: DataIngestionConfig,
    downloader: Downloader,
}

impl DataIngestion {
    pub fn new(
        config: DataIngestionConfig,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let mut downloader = Downloader::new(transport, sleeper, config.failed_dir.clone());
        if let Some(secs) = config.max_backoff_secs {
            downloader = downloader.with_max_backoff(Duration::from_secs(secs));
        }
        Self { config, downloader }
    }

    pub fn config(&self) -> &DataIngestionConfig {
        &self.config
    }

    /// Boundaries for this run's window.
    pub fn required_intervals(&self) -> Result<Vec<NaiveDate>, IngestError> {
        Ok(IntervalPlanner::plan(&self.config.window()?))
    }

    /// Download every sub-window in order. Intervals that exhaust their
    /// retries are counted and left out; nothing else is retried later.
    pub fn download_files(&mut self) -> Result<DownloadSummary, IngestError> {
        let boundaries = self.required_intervals()?;
        let sub_windows = IntervalPlanner::sub_windows(&boundaries);

        let mut summary = DownloadSummary {
            requested: sub_windows.len(),
            ..Default::default()
        };

        for (from, to) in sub_windows {
            let request = DownloadRequest::new(
                self.config.url_for(from, to),
                self.config.shard_path(from, to),
                self.config.retry_budget,
            );
            match self.downloader.fetch(request)? {
                WriteOutcome::Written { records, .. } => {
                    summary.succeeded += 1;
                    summary.records += records;
                }
                WriteOutcome::GaveUp { .. } => summary.gave_up += 1,
            }
        }

        info!(
            requested = summary.requested,
            succeeded = summary.succeeded,
            gave_up = summary.gave_up,
            records = summary.records,
            "download pass finished"
        );
        Ok(summary)
    }

    /// Append every downloaded shard to the feature store, oldest first.
    pub fn convert_files_to_feature_store(&self) -> Result<ConsolidationSummary, IngestError> {
        let store = FeatureStore::new(self.config.feature_store_path());
        let mut summary = ConsolidationSummary::default();

        for shard in self.shard_paths()? {
            summary.shards += 1;
            let tag = self.shard_tag(&shard);
            match store.append_shard(&shard, &tag)? {
                AppendOutcome::Appended { rows, .. } => {
                    summary.appended += 1;
                    summary.rows += rows;
                }
                AppendOutcome::Duplicate { part } => {
                    warn!(shard = %shard.display(), existing = %part.display(), "shard already stored");
                    summary.duplicates += 1;
                }
                AppendOutcome::Empty => summary.empty += 1,
            }
        }

        info!(
            store = %store.path().display(),
            appended = summary.appended,
            rows = summary.rows,
            "consolidated shards into feature store"
        );
        Ok(summary)
    }

    /// Record this run's window as the next resume point.
    pub fn write_metadata(&self) -> Result<(), IngestError> {
        IngestionMetadataStore::new(&self.config.metadata_file_path).write(
            self.config.from_date,
            self.config.to_date,
            &self.config.feature_store_path(),
        )?;
        Ok(())
    }

    /// Requests that exhausted their retries during this run.
    pub fn failed_downloads(&self) -> &[DownloadRequest] {
        self.downloader.failed_downloads()
    }

    pub fn run(&mut self) -> Result<DataIngestionArtifact, IngestError> {
        info!(
            from = %self.config.from_date,
            to = %self.config.to_date,
            "starting data ingestion"
        );

        if self.config.from_date != self.config.to_date {
            self.download_files()?;
        }

        // Nothing downloaded means nothing to consolidate, and the resume
        // point must not move.
        if self.config.download_dir.exists() {
            self.convert_files_to_feature_store()?;
            self.write_metadata()?;
        } else {
            info!("no downloads this run, feature store and metadata left as is");
        }

        Ok(DataIngestionArtifact {
            feature_store_path: self.config.feature_store_path(),
            download_dir: self.config.download_dir.clone(),
            metadata_file_path: self.config.metadata_file_path.clone(),
        })
    }

    fn shard_paths(&self) -> Result<Vec<PathBuf>, IngestError> {
        let dir = &self.config.download_dir;
        let mut shards = Vec::new();
        for entry in fs::read_dir(dir).map_err(IngestError::fs(format!("listing {}", dir.display())))? {
            let path = entry
                .map_err(IngestError::fs(format!("listing {}", dir.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                shards.push(path);
            }
        }
        shards.sort();
        Ok(shards)
    }

    /// `finance_complaint_2022-07-01_2022-07-05.json` -> `2022-07-01_2022-07-05`.
    fn shard_tag(&self, shard: &std::path::Path) -> String {
        let stem = shard
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{}_", self.config.file_name);
        stem.strip_prefix(&prefix).unwrap_or(&stem).to_string()
    }
}
