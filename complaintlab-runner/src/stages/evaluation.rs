//! Model evaluation: score the freshly trained model against the served one
//! on the accepted data and decide whether it replaces it.

use super::score_model;
use crate::artifact::{DataValidationArtifact, ModelEvaluationArtifact, ModelTrainerArtifact};
use crate::config::ModelEvaluationConfig;
use crate::engine::PipelineModel;
use crate::error::StageError;
use crate::resolver::ModelResolver;
use crate::table::read_parquet;
use polars::prelude::DataFrame;
use tracing::info;

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    validation: DataValidationArtifact,
    trainer: ModelTrainerArtifact,
}

impl ModelEvaluation {
    pub fn new(
        config: ModelEvaluationConfig,
        validation: DataValidationArtifact,
        trainer: ModelTrainerArtifact,
    ) -> Self {
        Self {
            config,
            validation,
            trainer,
        }
    }

    pub fn read_data(&self) -> Result<DataFrame, StageError> {
        let path = &self.validation.accepted_file_path;
        let df = read_parquet(path).map_err(StageError::table(path))?;
        Ok(df.head(Some(self.config.max_rows)))
    }

    /// Accept when nothing is served yet, or when the trained model beats the
    /// served one by more than `threshold`.
    pub fn decide(trained: f64, best: Option<f64>, threshold: f64) -> (bool, f64) {
        match best {
            None => (true, trained),
            Some(best) => {
                let improved = trained - best;
                (improved > threshold, improved)
            }
        }
    }

    pub fn initiate(self) -> Result<ModelEvaluationArtifact, StageError> {
        info!("starting model evaluation");
        let schema = &self.config.schema;
        let df = self.read_data()?;
        let trained_model_path = self.trainer.ref_artifact.trained_model_path.clone();

        let trained = PipelineModel::load(&trained_model_path)?;
        let trained_score = score_model(&trained, &df, schema)?.f1_score;

        let resolver = ModelResolver::new(&self.config.saved_models_dir);
        let best_model_path = resolver.latest_model_path()?;
        let best_score = match &best_model_path {
            Some(path) => {
                let best = PipelineModel::load(path)?;
                Some(score_model(&best, &df, schema)?.f1_score)
            }
            None => None,
        };

        let (model_accepted, improved_accuracy) =
            Self::decide(trained_score, best_score, self.config.change_threshold);

        let artifact = ModelEvaluationArtifact {
            model_accepted,
            improved_accuracy,
            trained_model_path,
            best_model_path,
            trained_model_score: trained_score,
            best_model_score: best_score,
        };
        info!(
            rows = df.height(),
            accepted = model_accepted,
            improved = improved_accuracy,
            "model evaluation finished"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_model_is_always_accepted() {
        assert_eq!(ModelEvaluation::decide(0.1, None, 0.02), (true, 0.1));
    }

    #[test]
    fn improvement_must_exceed_threshold() {
        let (accepted, improved) = ModelEvaluation::decide(0.80, Some(0.70), 0.02);
        assert!(accepted);
        assert!((improved - 0.10).abs() < 1e-12);

        let (accepted, _) = ModelEvaluation::decide(0.71, Some(0.70), 0.02);
        assert!(!accepted);

        let (accepted, improved) = ModelEvaluation::decide(0.60, Some(0.70), 0.02);
        assert!(!accepted);
        assert!(improved < 0.0);
    }
}
