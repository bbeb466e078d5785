//! Training pipeline orchestration.
//!
//! [`PipelineRunner`] is the state machine: it walks
//! Ingesting → Validating → Transforming → Training → Evaluating, then
//! Pushing only when evaluation accepted the model, and ends in Done. Any
//! stage error moves it to Failed and is returned wrapped with the stage
//! name. Nothing is rolled back.
//!
//! [`TrainingPipeline`] supplies the real stages. It can run the whole chain
//! in-process ([`TrainingPipeline::start`]) or one stage at a time
//! ([`TrainingPipeline::run_task`]) with artifacts passed through an
//! [`ArtifactHandoff`], which is how an external scheduler drives it.

use crate::artifact::{
    DataIngestionArtifact, DataTransformationArtifact, DataValidationArtifact,
    ModelEvaluationArtifact, ModelPusherArtifact, ModelTrainerArtifact,
};
use crate::config::TrainingPipelineConfig;
use crate::engine::MlEngine;
use crate::error::{PipelineError, StageError, StageName, StageResultExt};
use crate::handoff::{
    ArtifactHandoff, DATA_INGESTION_KEY, DATA_TRANSFORMATION_KEY, DATA_VALIDATION_KEY,
    MODEL_EVALUATION_KEY, MODEL_PUSHER_KEY, MODEL_TRAINER_KEY,
};
use crate::settings::PipelineSettings;
use crate::stages::{DataTransformation, DataValidation, ModelEvaluation, ModelPusher, ModelTrainer};
use chrono::NaiveDate;
use complaintlab_core::ingest::{Sleeper, Transport};
use complaintlab_core::DataIngestion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Ingesting,
    Validating,
    Transforming,
    Training,
    Evaluating,
    Pushing,
    Done,
    Failed,
}

/// The six training stages, each consuming the artifacts before it.
pub trait PipelineStages {
    fn ingest(&mut self) -> Result<DataIngestionArtifact, StageError>;

    fn validate(
        &mut self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact, StageError>;

    fn transform(
        &mut self,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact, StageError>;

    fn train(
        &mut self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, StageError>;

    fn evaluate(
        &mut self,
        validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
    ) -> Result<ModelEvaluationArtifact, StageError>;

    fn push(
        &mut self,
        evaluation: &ModelEvaluationArtifact,
    ) -> Result<ModelPusherArtifact, StageError>;
}

/// Every artifact of a completed run. `pusher` is `None` when evaluation
/// rejected the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub history: Vec<PipelineState>,
    pub ingestion: DataIngestionArtifact,
    pub validation: DataValidationArtifact,
    pub transformation: DataTransformationArtifact,
    pub trainer: ModelTrainerArtifact,
    pub evaluation: ModelEvaluationArtifact,
    pub pusher: Option<ModelPusherArtifact>,
}

pub struct PipelineRunner<S> {
    stages: S,
    state: Option<PipelineState>,
    history: Vec<PipelineState>,
}

impl<S: PipelineStages> PipelineRunner<S> {
    pub fn new(stages: S) -> Self {
        Self {
            stages,
            state: None,
            history: Vec::new(),
        }
    }

    /// Current state; `None` before the first stage starts.
    pub fn state(&self) -> Option<PipelineState> {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn stages(&self) -> &S {
        &self.stages
    }

    pub fn into_stages(self) -> S {
        self.stages
    }

    fn enter(&mut self, state: PipelineState) {
        info!(?state, "pipeline state");
        self.state = Some(state);
        self.history.push(state);
    }

    fn step<T>(
        &mut self,
        state: PipelineState,
        stage: StageName,
        run: impl FnOnce(&mut S) -> Result<T, StageError>,
    ) -> Result<T, PipelineError> {
        self.enter(state);
        let result = run(&mut self.stages).in_stage(stage);
        if let Err(err) = &result {
            error!(%stage, error = %err, "pipeline stage failed");
            self.enter(PipelineState::Failed);
        }
        result
    }

    pub fn run(&mut self) -> Result<PipelineOutcome, PipelineError> {
        let ingestion = self.step(PipelineState::Ingesting, StageName::DataIngestion, |s| {
            s.ingest()
        })?;
        let validation = self.step(PipelineState::Validating, StageName::DataValidation, |s| {
            s.validate(&ingestion)
        })?;
        let transformation = self.step(
            PipelineState::Transforming,
            StageName::DataTransformation,
            |s| s.transform(&validation),
        )?;
        let trainer = self.step(PipelineState::Training, StageName::ModelTrainer, |s| {
            s.train(&transformation)
        })?;
        let evaluation = self.step(PipelineState::Evaluating, StageName::ModelEvaluation, |s| {
            s.evaluate(&validation, &trainer)
        })?;

        let pusher = if evaluation.model_accepted {
            Some(self.step(PipelineState::Pushing, StageName::ModelPusher, |s| {
                s.push(&evaluation)
            })?)
        } else {
            info!("trained model rejected, nothing pushed");
            None
        };

        self.enter(PipelineState::Done);
        Ok(PipelineOutcome {
            history: self.history.clone(),
            ingestion,
            validation,
            transformation,
            trainer,
            evaluation,
            pusher,
        })
    }
}

/// The production stages for one run.
pub struct TrainingPipeline {
    config: TrainingPipelineConfig,
    settings: PipelineSettings,
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    engine: Arc<dyn MlEngine>,
    today: NaiveDate,
    handoff: ArtifactHandoff,
}

impl TrainingPipeline {
    pub fn new(
        config: TrainingPipelineConfig,
        settings: PipelineSettings,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        engine: Arc<dyn MlEngine>,
        today: NaiveDate,
    ) -> Self {
        let handoff = ArtifactHandoff::new(config.handoff_dir());
        Self {
            config,
            settings,
            transport,
            sleeper,
            engine,
            today,
            handoff,
        }
    }

    pub fn config(&self) -> &TrainingPipelineConfig {
        &self.config
    }

    pub fn handoff(&self) -> &ArtifactHandoff {
        &self.handoff
    }

    pub fn start_data_ingestion(&self) -> Result<DataIngestionArtifact, StageError> {
        let config = self.config.data_ingestion_config(&self.settings, self.today)?;
        let artifact =
            DataIngestion::new(config, self.transport.clone(), self.sleeper.clone()).run()?;
        self.handoff.push(DATA_INGESTION_KEY, &artifact)?;
        Ok(artifact)
    }

    pub fn start_data_validation(
        &self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact, StageError> {
        let config = self.config.data_validation_config(&self.settings);
        let artifact = DataValidation::new(config, ingestion.clone()).initiate()?;
        self.handoff.push(DATA_VALIDATION_KEY, &artifact)?;
        Ok(artifact)
    }

    pub fn start_data_transformation(
        &self,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact, StageError> {
        let config = self.config.data_transformation_config(&self.settings);
        let artifact =
            DataTransformation::new(config, validation.clone(), self.engine.clone()).initiate()?;
        self.handoff.push(DATA_TRANSFORMATION_KEY, &artifact)?;
        Ok(artifact)
    }

    pub fn start_model_trainer(
        &self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, StageError> {
        let config = self.config.model_trainer_config(&self.settings);
        let artifact =
            ModelTrainer::new(config, transformation.clone(), self.engine.clone()).initiate()?;
        self.handoff.push(MODEL_TRAINER_KEY, &artifact)?;
        Ok(artifact)
    }

    pub fn start_model_evaluation(
        &self,
        validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
    ) -> Result<ModelEvaluationArtifact, StageError> {
        let config = self.config.model_evaluation_config(&self.settings);
        let artifact =
            ModelEvaluation::new(config, validation.clone(), trainer.clone()).initiate()?;
        self.handoff.push(MODEL_EVALUATION_KEY, &artifact)?;
        Ok(artifact)
    }

    pub fn start_model_pusher(
        &self,
        evaluation: &ModelEvaluationArtifact,
    ) -> Result<ModelPusherArtifact, StageError> {
        let config = self.config.model_pusher_config();
        let artifact = ModelPusher::new(config, evaluation.clone()).initiate()?;
        self.handoff.push(MODEL_PUSHER_KEY, &artifact)?;
        Ok(artifact)
    }

    /// Run every stage in-process.
    pub fn start(self) -> Result<PipelineOutcome, PipelineError> {
        info!(
            pipeline = %self.config.pipeline_name,
            run = %self.config.run_timestamp,
            engine = self.engine.name(),
            "starting training pipeline"
        );
        PipelineRunner::new(self).run()
    }

    /// Run one stage, pulling its inputs from the handoff and pushing its
    /// artifact back. Returns the handoff file written, or `None` when the
    /// pusher found a rejected model and skipped.
    pub fn run_task(&self, stage: StageName) -> Result<Option<PathBuf>, PipelineError> {
        info!(%stage, run = %self.config.run_timestamp, "running task");
        self.task(stage).in_stage(stage)
    }

    fn task(&self, stage: StageName) -> Result<Option<PathBuf>, StageError> {
        let h = &self.handoff;
        match stage {
            StageName::DataIngestion => {
                self.start_data_ingestion()?;
                Ok(Some(h.path_for(DATA_INGESTION_KEY)))
            }
            StageName::DataValidation => {
                self.start_data_validation(&h.pull::<DataIngestionArtifact>(DATA_INGESTION_KEY)?)?;
                Ok(Some(h.path_for(DATA_VALIDATION_KEY)))
            }
            StageName::DataTransformation => {
                self.start_data_transformation(&h.pull::<DataValidationArtifact>(DATA_VALIDATION_KEY)?)?;
                Ok(Some(h.path_for(DATA_TRANSFORMATION_KEY)))
            }
            StageName::ModelTrainer => {
                self.start_model_trainer(&h.pull::<DataTransformationArtifact>(DATA_TRANSFORMATION_KEY)?)?;
                Ok(Some(h.path_for(MODEL_TRAINER_KEY)))
            }
            StageName::ModelEvaluation => {
                let validation: DataValidationArtifact = h.pull(DATA_VALIDATION_KEY)?;
                let trainer: ModelTrainerArtifact = h.pull(MODEL_TRAINER_KEY)?;
                self.start_model_evaluation(&validation, &trainer)?;
                Ok(Some(h.path_for(MODEL_EVALUATION_KEY)))
            }
            StageName::ModelPusher => {
                let evaluation: ModelEvaluationArtifact = h.pull(MODEL_EVALUATION_KEY)?;
                if !evaluation.model_accepted {
                    info!("trained model rejected, nothing pushed");
                    return Ok(None);
                }
                self.start_model_pusher(&evaluation)?;
                Ok(Some(h.path_for(MODEL_PUSHER_KEY)))
            }
            StageName::BatchPrediction => Err(StageError::Contract(
                "batch prediction is not a training task".into(),
            )),
        }
    }
}

impl PipelineStages for TrainingPipeline {
    fn ingest(&mut self) -> Result<DataIngestionArtifact, StageError> {
        self.start_data_ingestion()
    }

    fn validate(
        &mut self,
        ingestion: &DataIngestionArtifact,
    ) -> Result<DataValidationArtifact, StageError> {
        self.start_data_validation(ingestion)
    }

    fn transform(
        &mut self,
        validation: &DataValidationArtifact,
    ) -> Result<DataTransformationArtifact, StageError> {
        self.start_data_transformation(validation)
    }

    fn train(
        &mut self,
        transformation: &DataTransformationArtifact,
    ) -> Result<ModelTrainerArtifact, StageError> {
        self.start_model_trainer(transformation)
    }

    fn evaluate(
        &mut self,
        validation: &DataValidationArtifact,
        trainer: &ModelTrainerArtifact,
    ) -> Result<ModelEvaluationArtifact, StageError> {
        self.start_model_evaluation(validation, trainer)
    }

    fn push(
        &mut self,
        evaluation: &ModelEvaluationArtifact,
    ) -> Result<ModelPusherArtifact, StageError> {
        self.start_model_pusher(evaluation)
    }
}
