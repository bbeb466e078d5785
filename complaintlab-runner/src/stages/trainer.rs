//! Model training: label indexer, classifier, train/test scores, and the
//! combined feature + classifier pipeline.

use super::score_model;
use crate::artifact::{DataTransformationArtifact, ModelTrainerArtifact, ModelTrainerRefArtifact};
use crate::config::ModelTrainerConfig;
use crate::engine::{ClassifierColumns, MlEngine, PipelineModel, PipelineStage};
use crate::error::StageError;
use crate::table::read_parquet;
use polars::prelude::DataFrame;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct ModelTrainer {
    config: ModelTrainerConfig,
    transformation: DataTransformationArtifact,
    engine: Arc<dyn MlEngine>,
}

impl ModelTrainer {
    pub fn new(
        config: ModelTrainerConfig,
        transformation: DataTransformationArtifact,
        engine: Arc<dyn MlEngine>,
    ) -> Self {
        Self {
            config,
            transformation,
            engine,
        }
    }

    fn read(path: &Path) -> Result<DataFrame, StageError> {
        read_parquet(path).map_err(StageError::table(path))
    }

    /// Classifier followed by the index-to-label mapping.
    fn fit_model(&self, train: &DataFrame, labels: &[String]) -> Result<PipelineModel, StageError> {
        let schema = &self.config.schema;
        let prediction = schema.prediction_column().to_string();
        let classifier = self.engine.fit_classifier(
            train,
            &ClassifierColumns {
                categorical: schema.indexed_features(),
                numeric: schema.scaled_features(),
                label: schema.target_indexed_label(),
                prediction: prediction.clone(),
            },
        )?;
        Ok(PipelineModel::new(vec![
            classifier,
            PipelineStage::IndexToString {
                input_col: prediction,
                output_col: schema.prediction_label_column(),
                labels: labels.to_vec(),
            },
        ]))
    }

    pub fn initiate(self) -> Result<ModelTrainerArtifact, StageError> {
        info!("starting model training");
        let schema = &self.config.schema;
        let mut train = Self::read(&self.transformation.transformed_train_path)?;
        let mut test = Self::read(&self.transformation.transformed_test_path)?;
        info!(train_rows = train.height(), test_rows = test.height(), "loaded transformed data");

        let label_indexer = self.engine.fit_label_indexer(
            &train,
            &schema.target_column,
            &schema.target_indexed_label(),
        )?;
        let labels = label_indexer
            .labels()
            .map(<[String]>::to_vec)
            .unwrap_or_default();
        PipelineModel::new(vec![label_indexer.clone()]).save(&self.config.label_indexer_dir)?;
        label_indexer.transform(&mut train)?;
        label_indexer.transform(&mut test)?;

        let model = self.fit_model(&train, &labels)?;

        let train_metrics = score_model(&model, &train, schema)?;
        let test_metrics = score_model(&model, &test, schema)?;
        info!(
            train_f1 = train_metrics.f1_score,
            test_f1 = test_metrics.f1_score,
            "scored trained model"
        );

        let feature_pipeline = PipelineModel::load(&self.transformation.exported_pipeline_path)?;
        let trained_model = feature_pipeline.then(model);
        trained_model.save(&self.config.trained_model_dir)?;

        let artifact = ModelTrainerArtifact {
            ref_artifact: ModelTrainerRefArtifact {
                trained_model_path: self.config.trained_model_dir,
                label_indexer_path: self.config.label_indexer_dir,
            },
            train_metrics: train_metrics.to_artifact(),
            test_metrics: test_metrics.to_artifact(),
        };
        info!(?artifact, "model training finished");
        Ok(artifact)
    }
}
