//! Model pusher: copies an accepted model into the run's pusher directory
//! and into `saved_models/<run_timestamp>/model`, where it becomes the
//! served model.

use crate::artifact::{ModelEvaluationArtifact, ModelPusherArtifact};
use crate::config::ModelPusherConfig;
use crate::engine::PipelineModel;
use crate::error::StageError;
use tracing::info;

pub struct ModelPusher {
    config: ModelPusherConfig,
    evaluation: ModelEvaluationArtifact,
}

impl ModelPusher {
    pub fn new(config: ModelPusherConfig, evaluation: ModelEvaluationArtifact) -> Self {
        Self { config, evaluation }
    }

    pub fn push_model(&self) -> Result<(), StageError> {
        let model = PipelineModel::load(&self.evaluation.trained_model_path)?;
        model.save(&self.config.saved_model_dir)?;
        model.save(&self.config.pusher_model_dir)?;
        Ok(())
    }

    pub fn initiate(self) -> Result<ModelPusherArtifact, StageError> {
        if !self.evaluation.model_accepted {
            return Err(StageError::Contract(
                "refusing to push a model that evaluation rejected".into(),
            ));
        }
        info!(model = %self.evaluation.trained_model_path.display(), "pushing model");
        self.push_model()?;
        let artifact = ModelPusherArtifact {
            pusher_dir: self.config.pusher_model_dir,
            saved_model_dir: self.config.saved_model_dir,
        };
        info!(?artifact, "model pusher finished");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PipelineStage;
    use std::path::Path;

    fn evaluation(trained: &Path, accepted: bool) -> ModelEvaluationArtifact {
        ModelEvaluationArtifact {
            model_accepted: accepted,
            improved_accuracy: 0.5,
            trained_model_path: trained.to_path_buf(),
            best_model_path: None,
            trained_model_score: 0.5,
            best_model_score: None,
        }
    }

    fn config(dir: &Path) -> ModelPusherConfig {
        ModelPusherConfig {
            pusher_model_dir: dir.join("run/model_pusher/model"),
            saved_model_dir: dir.join("saved_models/20230426_120000/model"),
        }
    }

    #[test]
    fn accepted_model_lands_in_both_locations() {
        let dir = tempfile::tempdir().unwrap();
        let trained = dir.path().join("trained");
        let model = PipelineModel::new(vec![PipelineStage::IndexToString {
            input_col: "prediction".into(),
            output_col: "prediction_label".into(),
            labels: vec!["No".into(), "Yes".into()],
        }]);
        model.save(&trained).unwrap();

        let artifact = ModelPusher::new(config(dir.path()), evaluation(&trained, true))
            .initiate()
            .unwrap();

        assert_eq!(PipelineModel::load(&artifact.saved_model_dir).unwrap(), model);
        assert_eq!(PipelineModel::load(&artifact.pusher_dir).unwrap(), model);
    }

    #[test]
    fn rejected_model_is_not_pushed() {
        let dir = tempfile::tempdir().unwrap();
        let trained = dir.path().join("trained");
        PipelineModel::default().save(&trained).unwrap();

        let err = ModelPusher::new(config(dir.path()), evaluation(&trained, false))
            .initiate()
            .unwrap_err();
        assert!(matches!(err, StageError::Contract(_)));
        assert!(!dir.path().join("saved_models").exists());
    }
}
