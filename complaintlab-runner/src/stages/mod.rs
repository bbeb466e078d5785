//! The five stages after ingestion. Each takes its resolved config plus the
//! artifact(s) it consumes and returns its own artifact.

pub mod evaluation;
pub mod pusher;
pub mod trainer;
pub mod transformation;
pub mod validation;

pub use evaluation::ModelEvaluation;
pub use pusher::ModelPusher;
pub use trainer::ModelTrainer;
pub use transformation::DataTransformation;
pub use validation::{DataValidation, MissingReport};

use crate::engine::PipelineModel;
use crate::error::StageError;
use crate::metrics::ClassificationMetrics;
use crate::schema::ComplaintSchema;
use crate::table::{has_column, string_values};
use polars::prelude::DataFrame;

/// Apply `model` to `df` and score its predicted labels against the target.
pub(crate) fn score_model(
    model: &PipelineModel,
    df: &DataFrame,
    schema: &ComplaintSchema,
) -> Result<ClassificationMetrics, StageError> {
    let scored = model.transform(df)?;
    let prediction_col = schema.prediction_label_column();
    if !has_column(&scored, &prediction_col) {
        return Err(StageError::Contract(format!(
            "model does not produce '{prediction_col}'"
        )));
    }
    let truth = string_values(&scored, &schema.target_column)?;
    let predicted = string_values(&scored, &prediction_col)?;
    Ok(ClassificationMetrics::compute(&truth, &predicted))
}
