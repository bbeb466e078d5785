//! ML capability interface.
//!
//! Stages never fit or apply models directly; they ask an [`MlEngine`] for
//! fitted [`PipelineStage`]s and chain them into a [`PipelineModel`]. The
//! model is a plain serde value, so saving, loading and concatenating
//! pipelines works the same whichever engine produced the stages.
//!
//! - `model` — `PipelineStage` / `PipelineModel`: transform, save, load
//! - `baseline` — the reference engine (frequency imputation, indexing,
//!   scaling, categorical + gaussian naive Bayes)

pub mod baseline;
pub mod model;

pub use baseline::{BaselineEngine, NaiveBayesModel};
pub use model::{PipelineModel, PipelineStage, MODEL_FILE_NAME};

use crate::schema::ComplaintSchema;
use polars::prelude::{DataFrame, PolarsError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("cannot fit {what}: {reason}")]
    Fit { what: String, reason: String },
    #[error("model I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model file {} is invalid: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Columns the classifier reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierColumns {
    /// Category indices.
    pub categorical: Vec<String>,
    /// Continuous values.
    pub numeric: Vec<String>,
    /// Indexed label used for fitting.
    pub label: String,
    /// Output: predicted label index.
    pub prediction: String,
}

/// Fits the stages the training pipeline needs.
pub trait MlEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Feature pipeline over the raw validated columns: derived features,
    /// imputers, indexers and scalers, fitted on `train`.
    fn fit_feature_pipeline(
        &self,
        train: &DataFrame,
        schema: &ComplaintSchema,
    ) -> Result<PipelineModel, EngineError>;

    /// String-to-index mapping of `input_col`, most frequent label first.
    fn fit_label_indexer(
        &self,
        train: &DataFrame,
        input_col: &str,
        output_col: &str,
    ) -> Result<PipelineStage, EngineError>;

    fn fit_classifier(
        &self,
        train: &DataFrame,
        columns: &ClassifierColumns,
    ) -> Result<PipelineStage, EngineError>;
}
