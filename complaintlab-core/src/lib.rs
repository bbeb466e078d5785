//! ComplaintLab Core — incremental ingestion of the consumer complaints dataset.
//!
//! This crate owns everything that happens before training:
//! - Interval planning for paginated date-window downloads
//! - Downloading with bounded retry, wait-hint backoff and dead-lettering
//! - A single-record metadata file used as the resume point across runs
//! - A Parquet feature store that grows by one part per downloaded shard
//! - The ingestion stage that strings these together and returns its artifact

pub mod ingest;

pub use ingest::{DataIngestion, DataIngestionArtifact, DataIngestionConfig, IngestError};
