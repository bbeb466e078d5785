//! Fitted pipeline stages and their persistence.

use super::baseline::NaiveBayesModel;
use super::EngineError;
use crate::table::{f64_values, has_column, index_values, put_column, string_values};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// File holding a saved pipeline inside its directory.
pub const MODEL_FILE_NAME: &str = "pipeline.json";

/// One fitted transformation. Each stage reads its input column(s) and adds
/// or replaces its output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Whole days from `start_col` to `end_col`. Both are read as text and
    /// only their leading `YYYY-MM-DD` is used.
    DateDiff {
        start_col: String,
        end_col: String,
        output_col: String,
    },
    /// Missing or NaN values become the training mean.
    MeanImputer {
        input_col: String,
        output_col: String,
        mean: f64,
    },
    /// Missing values become the most frequent training value.
    FrequencyImputer {
        input_col: String,
        output_col: String,
        most_frequent: String,
    },
    /// Value to position in `labels`; unseen values map to `labels.len()`,
    /// missing values stay missing.
    StringIndexer {
        input_col: String,
        output_col: String,
        labels: Vec<String>,
    },
    StandardScaler {
        input_col: String,
        output_col: String,
        mean: f64,
        std: f64,
    },
    NaiveBayes(NaiveBayesModel),
    /// Index back to its label; out-of-range indices become missing.
    IndexToString {
        input_col: String,
        output_col: String,
        labels: Vec<String>,
    },
}

impl PipelineStage {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineStage::DateDiff { .. } => "date_diff",
            PipelineStage::MeanImputer { .. } => "mean_imputer",
            PipelineStage::FrequencyImputer { .. } => "frequency_imputer",
            PipelineStage::StringIndexer { .. } => "string_indexer",
            PipelineStage::StandardScaler { .. } => "standard_scaler",
            PipelineStage::NaiveBayes(_) => "naive_bayes",
            PipelineStage::IndexToString { .. } => "index_to_string",
        }
    }

    /// Labels of an indexer stage.
    pub fn labels(&self) -> Option<&[String]> {
        match self {
            PipelineStage::StringIndexer { labels, .. }
            | PipelineStage::IndexToString { labels, .. } => Some(labels),
            _ => None,
        }
    }

    pub fn transform(&self, df: &mut DataFrame) -> Result<(), EngineError> {
        match self {
            PipelineStage::DateDiff {
                start_col,
                end_col,
                output_col,
            } => {
                let starts = string_values(df, require(df, start_col)?)?;
                let ends = string_values(df, require(df, end_col)?)?;
                let diffs: Vec<Option<f64>> = starts
                    .iter()
                    .zip(&ends)
                    .map(|(s, e)| {
                        let s = parse_day(s.as_deref()?)?;
                        let e = parse_day(e.as_deref()?)?;
                        Some((e - s).num_days() as f64)
                    })
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), diffs))?;
            }
            PipelineStage::MeanImputer {
                input_col,
                output_col,
                mean,
            } => {
                let values: Vec<f64> = f64_values(df, require(df, input_col)?)?
                    .into_iter()
                    .map(|v| v.filter(|x| !x.is_nan()).unwrap_or(*mean))
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), values))?;
            }
            PipelineStage::FrequencyImputer {
                input_col,
                output_col,
                most_frequent,
            } => {
                let values: Vec<String> = string_values(df, require(df, input_col)?)?
                    .into_iter()
                    .map(|v| v.unwrap_or_else(|| most_frequent.clone()))
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), values))?;
            }
            PipelineStage::StringIndexer {
                input_col,
                output_col,
                labels,
            } => {
                let lookup: HashMap<&str, u32> = labels
                    .iter()
                    .enumerate()
                    .map(|(i, l)| (l.as_str(), i as u32))
                    .collect();
                let unseen = labels.len() as u32;
                let indices: Vec<Option<u32>> = string_values(df, require(df, input_col)?)?
                    .iter()
                    .map(|v| {
                        v.as_deref()
                            .map(|s| lookup.get(s).copied().unwrap_or(unseen))
                    })
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), indices))?;
            }
            PipelineStage::StandardScaler {
                input_col,
                output_col,
                mean,
                std,
            } => {
                let scale = if *std > 0.0 { *std } else { 1.0 };
                let values: Vec<Option<f64>> = f64_values(df, require(df, input_col)?)?
                    .into_iter()
                    .map(|v| v.map(|x| (x - mean) / scale))
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), values))?;
            }
            PipelineStage::NaiveBayes(model) => {
                let predictions = model.predict(df)?;
                put_column(
                    df,
                    Column::new(model.prediction_col.as_str().into(), predictions),
                )?;
            }
            PipelineStage::IndexToString {
                input_col,
                output_col,
                labels,
            } => {
                let values: Vec<Option<String>> = index_values(df, require(df, input_col)?)?
                    .into_iter()
                    .map(|v| v.and_then(|i| labels.get(i as usize).cloned()))
                    .collect();
                put_column(df, Column::new(output_col.as_str().into(), values))?;
            }
        }
        Ok(())
    }
}

/// Ordered list of fitted stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineModel {
    pub stages: Vec<PipelineStage>,
}

impl PipelineModel {
    pub fn new(stages: Vec<PipelineStage>) -> Self {
        Self { stages }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// This pipeline followed by `other`.
    pub fn then(mut self, other: PipelineModel) -> Self {
        self.stages.extend(other.stages);
        self
    }

    /// Apply every stage in order to a copy of `df`.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame, EngineError> {
        let mut out = df.clone();
        for stage in &self.stages {
            stage.transform(&mut out)?;
        }
        Ok(out)
    }

    /// Save under `dir` (created if needed) as [`MODEL_FILE_NAME`].
    pub fn save(&self, dir: &Path) -> Result<(), EngineError> {
        let io = |source| EngineError::Io {
            path: dir.to_path_buf(),
            source,
        };
        fs::create_dir_all(dir).map_err(io)?;

        let path = dir.join(MODEL_FILE_NAME);
        let json = serde_json::to_string_pretty(self).map_err(|source| EngineError::Format {
            path: path.clone(),
            source,
        })?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io)?;
        fs::rename(&tmp_path, &path).map_err(io)?;
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, EngineError> {
        let path = dir.join(MODEL_FILE_NAME);
        let content = fs::read_to_string(&path).map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| EngineError::Format { path, source })
    }

    /// True when `dir` holds a saved pipeline.
    pub fn exists(dir: &Path) -> bool {
        dir.join(MODEL_FILE_NAME).is_file()
    }
}

fn require<'a>(df: &DataFrame, column: &'a str) -> Result<&'a str, EngineError> {
    if has_column(df, column) {
        Ok(column)
    } else {
        Err(EngineError::MissingColumn(column.to_string()))
    }
}

/// Leading `YYYY-MM-DD` of a date or timestamp string.
pub(crate) fn parse_day(value: &str) -> Option<NaiveDate> {
    let day = value.trim().get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}
