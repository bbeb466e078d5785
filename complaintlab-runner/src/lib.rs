//! ComplaintLab Runner — the training pipeline after ingestion.
//!
//! This crate builds on `complaintlab-core` to provide:
//! - TOML pipeline settings and per-stage config resolution
//! - Stage artifacts and a keyed handoff for separately scheduled tasks
//! - An ML engine interface with a reference naive Bayes engine
//! - Validation, transformation, training, evaluation and pushing stages
//! - Served-model resolution and batch prediction
//! - The orchestrator that only pushes accepted models

pub mod artifact;
pub mod config;
pub mod engine;
pub mod error;
pub mod handoff;
pub mod metrics;
pub mod pipeline;
pub mod prediction;
pub mod resolver;
pub mod schema;
pub mod settings;
pub mod stages;
pub mod table;

pub use artifact::{
    ClassificationMetricArtifact, DataIngestionArtifact, DataTransformationArtifact,
    DataValidationArtifact, ModelEvaluationArtifact, ModelPusherArtifact, ModelTrainerArtifact,
    ModelTrainerRefArtifact,
};
pub use config::{
    DataTransformationConfig, DataValidationConfig, ModelEvaluationConfig, ModelPusherConfig,
    ModelTrainerConfig, TrainingPipelineConfig, RUN_TIMESTAMP_FORMAT,
};
pub use engine::{BaselineEngine, EngineError, MlEngine, PipelineModel, PipelineStage};
pub use error::{PipelineError, StageError, StageName};
pub use handoff::{ArtifactHandoff, HandoffError};
pub use metrics::ClassificationMetrics;
pub use pipeline::{PipelineOutcome, PipelineRunner, PipelineStages, PipelineState, TrainingPipeline};
pub use prediction::{BatchPrediction, BatchPredictionConfig};
pub use resolver::ModelResolver;
pub use schema::ComplaintSchema;
pub use settings::{ConfigError, EnvironmentSettings, PipelineSettings};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn artifacts_are_send_sync() {
        assert_send::<DataValidationArtifact>();
        assert_sync::<DataValidationArtifact>();
        assert_send::<ModelTrainerArtifact>();
        assert_sync::<ModelTrainerArtifact>();
        assert_send::<ModelEvaluationArtifact>();
        assert_sync::<ModelEvaluationArtifact>();
        assert_send::<PipelineOutcome>();
        assert_sync::<PipelineOutcome>();
    }

    #[test]
    fn models_are_send_sync() {
        assert_send::<PipelineModel>();
        assert_sync::<PipelineModel>();
        assert_send::<BaselineEngine>();
        assert_sync::<BaselineEngine>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<PipelineSettings>();
        assert_sync::<PipelineSettings>();
        assert_send::<TrainingPipelineConfig>();
        assert_sync::<TrainingPipelineConfig>();
    }

    #[test]
    fn pipeline_is_send() {
        assert_send::<TrainingPipeline>();
        assert_send::<PipelineError>();
    }
}
