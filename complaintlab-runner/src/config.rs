//! Per-run stage configs.
//!
//! `TrainingPipelineConfig` fixes the run's identity; every stage config is
//! resolved from it plus [`PipelineSettings`] at the start of the stage and
//! never stored on its own.
//!
//! Layout (`R` = artifact root, `P = R/<pipeline_name>`, `A = P/<run_timestamp>`):
//! - `P/data_ingestion/...` (cross-run, see `complaintlab_core::ingest`)
//! - `A/data_validation/{accepted_data,rejected_data}/`
//! - `A/data_transformation/{transformed_pipeline,train,test}/`
//! - `A/model_trainer/{trained_model,label_indexer}/`
//! - `A/model_pusher/model/`
//! - `R/saved_models/<run_timestamp>/model/`

use crate::schema::ComplaintSchema;
use crate::settings::PipelineSettings;
use chrono::{Local, NaiveDate};
use complaintlab_core::ingest::{DataIngestionConfig, IngestError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Format of `run_timestamp`.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub const SAVED_MODELS_DIR: &str = "saved_models";
pub const MODEL_DIR: &str = "model";

/// Identity of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingPipelineConfig {
    pub pipeline_name: String,
    pub run_timestamp: String,
    pub artifact_root: PathBuf,
}

impl TrainingPipelineConfig {
    pub fn new(
        pipeline_name: impl Into<String>,
        run_timestamp: impl Into<String>,
        artifact_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            run_timestamp: run_timestamp.into(),
            artifact_root: artifact_root.into(),
        }
    }

    /// A fresh run stamped with the local time.
    pub fn now(settings: &PipelineSettings) -> Self {
        Self::new(
            settings.pipeline_name.clone(),
            Local::now().format(RUN_TIMESTAMP_FORMAT).to_string(),
            settings.artifact_root.clone(),
        )
    }

    /// `R/<pipeline_name>`, shared by every run.
    pub fn pipeline_dir(&self) -> PathBuf {
        self.artifact_root.join(&self.pipeline_name)
    }

    /// `R/<pipeline_name>/<run_timestamp>`.
    pub fn artifact_dir(&self) -> PathBuf {
        self.pipeline_dir().join(&self.run_timestamp)
    }

    pub fn saved_models_dir(&self) -> PathBuf {
        self.artifact_root.join(SAVED_MODELS_DIR)
    }

    pub fn handoff_dir(&self) -> PathBuf {
        self.artifact_dir().join("handoff")
    }

    pub fn data_ingestion_config(
        &self,
        settings: &PipelineSettings,
        today: NaiveDate,
    ) -> Result<DataIngestionConfig, IngestError> {
        DataIngestionConfig::resolve(
            &self.pipeline_dir(),
            &self.run_timestamp,
            &settings.ingestion,
            today,
        )
    }

    pub fn data_validation_config(&self, settings: &PipelineSettings) -> DataValidationConfig {
        let dir = self.artifact_dir().join("data_validation");
        DataValidationConfig {
            accepted_data_dir: dir.join("accepted_data"),
            rejected_data_dir: dir.join("rejected_data"),
            file_name: settings.ingestion.file_name.clone(),
            max_rows: settings.validation.max_rows,
            missing_threshold: settings.validation.missing_threshold,
            schema: settings.schema.clone(),
        }
    }

    pub fn data_transformation_config(
        &self,
        settings: &PipelineSettings,
    ) -> DataTransformationConfig {
        let dir = self.artifact_dir().join("data_transformation");
        DataTransformationConfig {
            export_pipeline_dir: dir.join("transformed_pipeline"),
            transformed_train_dir: dir.join("train"),
            transformed_test_dir: dir.join("test"),
            file_name: settings.ingestion.file_name.clone(),
            test_size: settings.transformation.test_size,
            seed: settings.transformation.seed,
            schema: settings.schema.clone(),
        }
    }

    pub fn model_trainer_config(&self, settings: &PipelineSettings) -> ModelTrainerConfig {
        let dir = self.artifact_dir().join("model_trainer");
        ModelTrainerConfig {
            trained_model_dir: dir.join("trained_model"),
            label_indexer_dir: dir.join("label_indexer"),
            schema: settings.schema.clone(),
        }
    }

    pub fn model_evaluation_config(&self, settings: &PipelineSettings) -> ModelEvaluationConfig {
        ModelEvaluationConfig {
            saved_models_dir: self.saved_models_dir(),
            change_threshold: settings.evaluation.change_threshold,
            max_rows: settings.validation.max_rows,
            schema: settings.schema.clone(),
        }
    }

    pub fn model_pusher_config(&self) -> ModelPusherConfig {
        ModelPusherConfig {
            pusher_model_dir: self.artifact_dir().join("model_pusher").join(MODEL_DIR),
            saved_model_dir: self
                .saved_models_dir()
                .join(&self.run_timestamp)
                .join(MODEL_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataValidationConfig {
    pub accepted_data_dir: PathBuf,
    pub rejected_data_dir: PathBuf,
    pub file_name: String,
    pub max_rows: usize,
    pub missing_threshold: f64,
    pub schema: ComplaintSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataTransformationConfig {
    pub export_pipeline_dir: PathBuf,
    pub transformed_train_dir: PathBuf,
    pub transformed_test_dir: PathBuf,
    pub file_name: String,
    pub test_size: f64,
    pub seed: u64,
    pub schema: ComplaintSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelTrainerConfig {
    pub trained_model_dir: PathBuf,
    pub label_indexer_dir: PathBuf,
    pub schema: ComplaintSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEvaluationConfig {
    pub saved_models_dir: PathBuf,
    pub change_threshold: f64,
    pub max_rows: usize,
    pub schema: ComplaintSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPusherConfig {
    /// `A/model_pusher/model`
    pub pusher_model_dir: PathBuf,
    /// `R/saved_models/<run_timestamp>/model`
    pub saved_model_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> TrainingPipelineConfig {
        TrainingPipelineConfig::new("artifact", "20230426_120000", "/srv/app")
    }

    #[test]
    fn directories_follow_layout() {
        let p = pipeline();
        assert_eq!(p.pipeline_dir(), PathBuf::from("/srv/app/artifact"));
        assert_eq!(
            p.artifact_dir(),
            PathBuf::from("/srv/app/artifact/20230426_120000")
        );
        assert_eq!(p.saved_models_dir(), PathBuf::from("/srv/app/saved_models"));
        assert_eq!(
            p.handoff_dir(),
            PathBuf::from("/srv/app/artifact/20230426_120000/handoff")
        );
    }

    #[test]
    fn stage_configs_resolve_under_artifact_dir() {
        let p = pipeline();
        let settings = PipelineSettings::default();

        let validation = p.data_validation_config(&settings);
        assert!(validation.accepted_data_dir.ends_with("data_validation/accepted_data"));
        assert_eq!(validation.max_rows, 10_000);

        let transformation = p.data_transformation_config(&settings);
        assert!(transformation.transformed_train_dir.starts_with(p.artifact_dir()));
        assert!((transformation.test_size - 0.2).abs() < 1e-12);

        let trainer = p.model_trainer_config(&settings);
        assert!(trainer.label_indexer_dir.ends_with("model_trainer/label_indexer"));

        let pusher = p.model_pusher_config();
        assert_eq!(
            pusher.saved_model_dir,
            PathBuf::from("/srv/app/saved_models/20230426_120000/model")
        );
        assert_eq!(
            pusher.pusher_model_dir,
            PathBuf::from("/srv/app/artifact/20230426_120000/model_pusher/model")
        );
    }

    #[test]
    fn ingestion_config_is_rooted_at_pipeline_dir() {
        let p = pipeline();
        let mut settings = PipelineSettings::default();
        settings.ingestion.from_date = Some("2022-07-01".into());
        settings.ingestion.to_date = Some("2022-07-05".into());

        let config = p
            .data_ingestion_config(&settings, NaiveDate::from_ymd_opt(2023, 4, 26).unwrap())
            .unwrap();
        assert_eq!(
            config.metadata_file_path,
            PathBuf::from("/srv/app/artifact/data_ingestion/meta_info.yaml")
        );
        assert_eq!(
            config.download_dir,
            PathBuf::from("/srv/app/artifact/data_ingestion/20230426_120000/downloaded_files")
        );
    }

    #[test]
    fn now_uses_timestamp_format() {
        let p = TrainingPipelineConfig::now(&PipelineSettings::default());
        assert!(chrono::NaiveDateTime::parse_from_str(&p.run_timestamp, RUN_TIMESTAMP_FORMAT).is_ok());
    }
}
