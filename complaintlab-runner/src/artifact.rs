//! Stage outputs. Each stage consumes the previous stage's artifact by value
//! and every artifact round-trips through JSON for the task handoff.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use complaintlab_core::DataIngestionArtifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValidationArtifact {
    pub accepted_file_path: PathBuf,
    pub rejected_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataTransformationArtifact {
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub exported_pipeline_path: PathBuf,
}

/// Weighted classification scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetricArtifact {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTrainerRefArtifact {
    pub trained_model_path: PathBuf,
    pub label_indexer_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainerArtifact {
    pub ref_artifact: ModelTrainerRefArtifact,
    pub train_metrics: ClassificationMetricArtifact,
    pub test_metrics: ClassificationMetricArtifact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluationArtifact {
    pub model_accepted: bool,
    /// Trained score minus served score, or the trained score when nothing
    /// is served yet.
    pub improved_accuracy: f64,
    pub trained_model_path: PathBuf,
    pub best_model_path: Option<PathBuf>,
    pub trained_model_score: f64,
    pub best_model_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPusherArtifact {
    pub pusher_dir: PathBuf,
    pub saved_model_dir: PathBuf,
}
