//! Ingestion settings and the per-run resolved ingestion config.
//!
//! `IngestionSettings` is what a user writes (TOML section, every field
//! defaulted). `DataIngestionConfig` is derived from it for one run and is
//! where resumption happens: a prior metadata record overrides `from_date`.

use super::downloader::DEFAULT_RETRY_BUDGET;
use super::error::IngestError;
use super::http::COMPLAINTS_API_URL;
use super::interval::{IngestionWindow, DATE_FORMAT};
use super::metadata::{IngestionMetadataStore, METADATA_FILE_NAME};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DATA_INGESTION_DIR: &str = "data_ingestion";
pub const DOWNLOADED_DATA_DIR: &str = "downloaded_files";
pub const FAILED_DOWNLOAD_DIR: &str = "failed_downloaded_files";
pub const FEATURE_STORE_DIR: &str = "feature_store";
pub const DEFAULT_FILE_NAME: &str = "finance_complaint";
pub const DEFAULT_MIN_START_DATE: &str = "2019-01-01";

/// User-facing ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionSettings {
    /// Requested start (YYYY-MM-DD). Ignored once a metadata record exists.
    pub from_date: Option<String>,
    /// Requested end (YYYY-MM-DD). Defaults to today.
    pub to_date: Option<String>,
    /// Earliest date ever fetched; earlier requests are clamped up to it.
    pub min_start_date: String,
    /// URL template with `<fromdate>` / `<todate>` placeholders.
    pub source_url: String,
    /// Base name of downloaded shards and of the feature store.
    pub file_name: String,
    /// Retries per interval.
    pub retry_budget: u32,
    /// HTTP timeout per request, in seconds.
    pub request_timeout_secs: u64,
    /// Optional upper bound on one backoff sleep, in seconds. Unset means
    /// the server's hint plus padding is always honoured.
    pub max_backoff_secs: Option<u64>,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            from_date: None,
            to_date: None,
            min_start_date: DEFAULT_MIN_START_DATE.to_string(),
            source_url: COMPLAINTS_API_URL.to_string(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            retry_budget: DEFAULT_RETRY_BUDGET,
            request_timeout_secs: 60,
            max_backoff_secs: None,
        }
    }
}

/// Resolved ingestion config for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    /// `{pipeline_dir}/data_ingestion`, shared across runs.
    pub master_dir: PathBuf,
    /// `{master_dir}/{run_timestamp}`.
    pub ingestion_dir: PathBuf,
    pub download_dir: PathBuf,
    pub failed_dir: PathBuf,
    pub feature_store_dir: PathBuf,
    pub metadata_file_path: PathBuf,
    pub file_name: String,
    pub datasource_url: String,
    pub retry_budget: u32,
    pub request_timeout_secs: u64,
    pub max_backoff_secs: Option<u64>,
}

impl DataIngestionConfig {
    /// Resolve dates and paths for one run.
    ///
    /// `from_date` is, in order of precedence: the `to_date` of the stored
    /// metadata record; the requested date clamped up to `min_start_date`;
    /// `min_start_date`. `to_date` is the requested date or `today`.
    pub fn resolve(
        pipeline_dir: &Path,
        run_timestamp: &str,
        settings: &IngestionSettings,
        today: NaiveDate,
    ) -> Result<Self, IngestError> {
        let min_start = super::interval::parse_date(&settings.min_start_date)?;

        let requested_from = settings
            .from_date
            .as_deref()
            .map(super::interval::parse_date)
            .transpose()?
            .unwrap_or(min_start);
        let mut from_date = requested_from.max(min_start);

        let to_date = settings
            .to_date
            .as_deref()
            .map(super::interval::parse_date)
            .transpose()?
            .unwrap_or(today);

        let master_dir = pipeline_dir.join(DATA_INGESTION_DIR);
        let metadata_file_path = master_dir.join(METADATA_FILE_NAME);

        let store = IngestionMetadataStore::new(&metadata_file_path);
        if store.exists() {
            let record = store.read()?;
            tracing::info!(
                resume_from = %record.to_date,
                requested = %from_date,
                "resuming from previous ingestion"
            );
            from_date = record.to_date;
        }

        // Fails on an inverted window, e.g. a to_date before the resume point.
        IngestionWindow::new(from_date, to_date)?;

        let ingestion_dir = master_dir.join(run_timestamp);
        Ok(Self {
            from_date,
            to_date,
            download_dir: ingestion_dir.join(DOWNLOADED_DATA_DIR),
            failed_dir: ingestion_dir.join(FAILED_DOWNLOAD_DIR),
            feature_store_dir: master_dir.join(FEATURE_STORE_DIR),
            ingestion_dir,
            master_dir,
            metadata_file_path,
            file_name: settings.file_name.clone(),
            datasource_url: settings.source_url.clone(),
            retry_budget: settings.retry_budget,
            request_timeout_secs: settings.request_timeout_secs,
            max_backoff_secs: settings.max_backoff_secs,
        })
    }

    pub fn window(&self) -> Result<IngestionWindow, IngestError> {
        IngestionWindow::new(self.from_date, self.to_date)
    }

    /// `{feature_store_dir}/{file_name}`; stable across runs.
    pub fn feature_store_path(&self) -> PathBuf {
        self.feature_store_dir.join(&self.file_name)
    }

    /// URL for one sub-window.
    pub fn url_for(&self, from: NaiveDate, to: NaiveDate) -> String {
        self.datasource_url
            .replace("<todate>", &to.format(DATE_FORMAT).to_string())
            .replace("<fromdate>", &from.format(DATE_FORMAT).to_string())
    }

    /// Shard path for one sub-window; both bounds are embedded so windows
    /// never collide.
    pub fn shard_path(&self, from: NaiveDate, to: NaiveDate) -> PathBuf {
        self.download_dir.join(format!(
            "{}_{}_{}.json",
            self.file_name,
            from.format(DATE_FORMAT),
            to.format(DATE_FORMAT)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "complaintlab_ingest_config_{}_{id}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn settings(from: Option<&str>, to: Option<&str>) -> IngestionSettings {
        IngestionSettings {
            from_date: from.map(String::from),
            to_date: to.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn defaults_to_min_start_and_today() {
        let dir = temp_dir();
        let config =
            DataIngestionConfig::resolve(&dir, "run", &settings(None, None), d("2023-04-26"))
                .unwrap();
        assert_eq!(config.from_date, d("2019-01-01"));
        assert_eq!(config.to_date, d("2023-04-26"));
    }

    #[test]
    fn early_from_date_is_clamped() {
        let dir = temp_dir();
        let config = DataIngestionConfig::resolve(
            &dir,
            "run",
            &settings(Some("2015-06-01"), Some("2020-01-01")),
            d("2023-04-26"),
        )
        .unwrap();
        assert_eq!(config.from_date, d("2019-01-01"));
    }

    #[test]
    fn metadata_record_forces_resume_point() {
        let dir = temp_dir();
        IngestionMetadataStore::new(dir.join(DATA_INGESTION_DIR).join(METADATA_FILE_NAME))
            .write(d("2022-01-01"), d("2022-07-01"), &dir.join("fs"))
            .unwrap();

        let config = DataIngestionConfig::resolve(
            &dir,
            "run",
            &settings(Some("2020-03-03"), Some("2022-07-05")),
            d("2023-04-26"),
        )
        .unwrap();
        assert_eq!(config.from_date, d("2022-07-01"));
        assert_eq!(config.to_date, d("2022-07-05"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn to_date_before_resume_point_is_rejected() {
        let dir = temp_dir();
        IngestionMetadataStore::new(dir.join(DATA_INGESTION_DIR).join(METADATA_FILE_NAME))
            .write(d("2022-01-01"), d("2022-07-01"), &dir.join("fs"))
            .unwrap();

        let err = DataIngestionConfig::resolve(
            &dir,
            "run",
            &settings(None, Some("2022-06-01")),
            d("2023-04-26"),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_date_is_configuration_error() {
        let dir = temp_dir();
        let err = DataIngestionConfig::resolve(
            &dir,
            "run",
            &settings(Some("01/07/2022"), None),
            d("2023-04-26"),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[test]
    fn layout_and_url() {
        let dir = PathBuf::from("/artifacts/pipeline");
        let config = DataIngestionConfig::resolve(
            &dir,
            "20230426_120000",
            &settings(Some("2022-07-01"), Some("2022-07-05")),
            d("2023-04-26"),
        )
        .unwrap();

        assert_eq!(
            config.download_dir,
            dir.join("data_ingestion/20230426_120000/downloaded_files")
        );
        assert_eq!(
            config.failed_dir,
            dir.join("data_ingestion/20230426_120000/failed_downloaded_files")
        );
        assert_eq!(
            config.feature_store_path(),
            dir.join("data_ingestion/feature_store/finance_complaint")
        );
        assert_eq!(
            config.metadata_file_path,
            dir.join("data_ingestion/meta_info.yaml")
        );
        assert_eq!(
            config.shard_path(d("2022-07-01"), d("2022-07-05")),
            config
                .download_dir
                .join("finance_complaint_2022-07-01_2022-07-05.json")
        );

        let url = config.url_for(d("2022-07-01"), d("2022-07-05"));
        assert!(url.contains("date_received_max=2022-07-05"));
        assert!(url.contains("date_received_min=2022-07-01"));
        assert!(!url.contains('<'));
    }
}
