//! Structured error types for ingestion.
//!
//! Every variant carries the underlying cause and a marker of where it
//! happened, so the runner can surface one error kind per failed stage.

use polars::prelude::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Bad date inputs or missing configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport-level failure (connection refused, timeout, TLS).
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// Payload could not be decoded into a record list.
    #[error("malformed payload: {0}")]
    Serialization(String),

    #[error("filesystem error while {context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("feature store error while {context}: {source}")]
    FeatureStore {
        context: String,
        #[source]
        source: PolarsError,
    },

    #[error("no ingestion metadata at {}", path.display())]
    MetadataNotFound { path: PathBuf },

    #[error("corrupt ingestion metadata at {}: {source}", path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl IngestError {
    /// Adapter for `map_err` on `std::io` results.
    pub(crate) fn fs(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| IngestError::Filesystem { context, source }
    }

    /// Adapter for `map_err` on polars results.
    pub(crate) fn store(context: impl Into<String>) -> impl FnOnce(PolarsError) -> Self {
        let context = context.into();
        move |source| IngestError::FeatureStore { context, source }
    }
}
