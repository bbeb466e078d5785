//! Stage and pipeline error taxonomy.
//!
//! A stage fails with one [`StageError`]; the orchestrator wraps it in
//! [`PipelineError::Stage`] with the stage name so the chain reads
//! "stage X failed" caused by the underlying error.

use crate::engine::EngineError;
use crate::handoff::HandoffError;
use crate::settings::ConfigError;
use complaintlab_core::IngestError;
use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    DataIngestion,
    DataValidation,
    DataTransformation,
    ModelTrainer,
    ModelEvaluation,
    ModelPusher,
    BatchPrediction,
}

impl StageName {
    pub const TRAINING: [StageName; 6] = [
        StageName::DataIngestion,
        StageName::DataValidation,
        StageName::DataTransformation,
        StageName::ModelTrainer,
        StageName::ModelEvaluation,
        StageName::ModelPusher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::DataIngestion => "data_ingestion",
            StageName::DataValidation => "data_validation",
            StageName::DataTransformation => "data_transformation",
            StageName::ModelTrainer => "model_trainer",
            StageName::ModelEvaluation => "model_evaluation",
            StageName::ModelPusher => "model_pusher",
            StageName::BatchPrediction => "batch_prediction",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::TRAINING
            .into_iter()
            .chain([StageName::BatchPrediction])
            .find(|s| s.as_str() == value)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Ingestion(#[from] IngestError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("filesystem error while {context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("table error at {}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
    /// Data or artifacts do not satisfy what the stage requires.
    #[error("contract violation: {0}")]
    Contract(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

impl StageError {
    /// Adapter for `map_err` on `std::io` results.
    pub(crate) fn fs(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| StageError::Filesystem { context, source }
    }

    /// Adapter for `map_err` on table reads and writes.
    pub(crate) fn table(path: impl Into<PathBuf>) -> impl FnOnce(PolarsError) -> Self {
        let path = path.into();
        move |source| StageError::Table { path, source }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("stage {stage} failed")]
    Stage {
        stage: StageName,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> StageName {
        match self {
            PipelineError::Stage { stage, .. } => *stage,
        }
    }
}

/// Attach the failing stage to a stage result.
pub trait StageResultExt<T> {
    fn in_stage(self, stage: StageName) -> Result<T, PipelineError>;
}

impl<T, E: Into<StageError>> StageResultExt<T> for Result<T, E> {
    fn in_stage(self, stage: StageName) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::Stage {
            stage,
            source: e.into(),
        })
    }
}
