//! Batch prediction with the served model.
//!
//! Every `.json` (record array) or `.parquet` file in the input directory is
//! scored and written to `<output_dir>/<stem>_prediction.parquet` with the
//! original columns plus the predicted label.

use crate::config::TrainingPipelineConfig;
use crate::engine::PipelineModel;
use crate::error::StageError;
use crate::resolver::ModelResolver;
use crate::schema::ComplaintSchema;
use crate::table::{column_names, read_parquet, write_parquet};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct BatchPredictionConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub saved_models_dir: PathBuf,
    pub schema: ComplaintSchema,
}

impl BatchPredictionConfig {
    pub fn new(
        pipeline: &TrainingPipelineConfig,
        schema: ComplaintSchema,
        input_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            saved_models_dir: pipeline.saved_models_dir(),
            schema,
        }
    }
}

pub struct BatchPrediction {
    config: BatchPredictionConfig,
}

impl BatchPrediction {
    pub fn new(config: BatchPredictionConfig) -> Self {
        Self { config }
    }

    /// Input files, sorted by name.
    pub fn input_files(&self) -> Result<Vec<PathBuf>, StageError> {
        let dir = &self.config.input_dir;
        let context = format!("listing {}", dir.display());
        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(StageError::fs(context.clone()))? {
            let path = entry.map_err(StageError::fs(context.clone()))?.path();
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("parquet")
            ) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_input(path: &Path) -> Result<DataFrame, StageError> {
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let file = fs::File::open(path)
                .map_err(StageError::fs(format!("opening {}", path.display())))?;
            JsonReader::new(file)
                .finish()
                .map_err(StageError::table(path))
        } else {
            read_parquet(path).map_err(StageError::table(path))
        }
    }

    /// Score each input file; returns the written prediction files.
    pub fn start_prediction(&self) -> Result<Vec<PathBuf>, StageError> {
        let resolver = ModelResolver::new(&self.config.saved_models_dir);
        let model_path = resolver.latest_model_path()?.ok_or_else(|| {
            StageError::Contract(format!(
                "no served model under {}",
                self.config.saved_models_dir.display()
            ))
        })?;
        let model = PipelineModel::load(&model_path)?;
        info!(model = %model_path.display(), "loaded served model");

        let prediction_col = self.config.schema.prediction_label_column();
        let mut written = Vec::new();
        for input in self.input_files()? {
            let df = Self::read_input(&input)?;
            let mut keep = column_names(&df);
            keep.push(prediction_col.clone());
            let mut scored = model.transform(&df)?.select(keep)?;

            let stem = input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let output = self.config.output_dir.join(format!("{stem}_prediction.parquet"));
            write_parquet(&mut scored, &output).map_err(StageError::table(&output))?;
            info!(input = %input.display(), rows = scored.height(), "wrote predictions");
            written.push(output);
        }
        Ok(written)
    }
}
