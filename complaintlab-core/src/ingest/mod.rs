//! Incremental ingestion of the complaints dataset.
//!
//! - `interval` — splits a date window into download sub-windows
//! - `downloader` — one GET per attempt, bounded retry, dead letters
//! - `metadata` — single resume-point record
//! - `feature_store` — Parquet part files appended per shard
//! - `service` — the stage tying the above together

pub mod config;
pub mod downloader;
pub mod error;
pub mod feature_store;
pub mod http;
pub mod interval;
pub mod metadata;
pub mod payload;
pub mod service;
pub mod transport;

pub use config::{DataIngestionConfig, IngestionSettings};
pub use downloader::{DownloadRequest, Downloader, WriteOutcome, DEFAULT_RETRY_BUDGET};
pub use error::IngestError;
pub use feature_store::{AppendOutcome, FeatureStore};
pub use http::{HttpTransport, COMPLAINTS_API_URL};
pub use interval::{IngestionWindow, IntervalPlanner, Span};
pub use metadata::{IngestionMetadataRecord, IngestionMetadataStore};
pub use service::{ConsolidationSummary, DataIngestion, DataIngestionArtifact, DownloadSummary};
pub use transport::{RawResponse, Sleeper, ThreadSleeper, Transport};
