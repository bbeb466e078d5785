//! Locates served models under `saved_models/<run_timestamp>/model`.

use crate::config::{MODEL_DIR, RUN_TIMESTAMP_FORMAT};
use crate::engine::PipelineModel;
use crate::error::StageError;
use chrono::NaiveDateTime;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ModelResolver {
    saved_models_dir: PathBuf,
}

impl ModelResolver {
    pub fn new(saved_models_dir: impl Into<PathBuf>) -> Self {
        Self {
            saved_models_dir: saved_models_dir.into(),
        }
    }

    pub fn saved_models_dir(&self) -> &Path {
        &self.saved_models_dir
    }

    /// Where a model pushed by run `run_timestamp` goes.
    pub fn save_model_path(&self, run_timestamp: &str) -> PathBuf {
        self.saved_models_dir.join(run_timestamp).join(MODEL_DIR)
    }

    /// Saved runs holding a loadable model, oldest first.
    pub fn saved_runs(&self) -> Result<Vec<NaiveDateTime>, StageError> {
        if !self.saved_models_dir.is_dir() {
            return Ok(Vec::new());
        }
        let context = format!("listing {}", self.saved_models_dir.display());
        let mut runs = Vec::new();
        for entry in fs::read_dir(&self.saved_models_dir).map_err(StageError::fs(context.clone()))? {
            let entry = entry.map_err(StageError::fs(context.clone()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // Anything not named like a run timestamp is ignored.
            let Ok(stamp) = NaiveDateTime::parse_from_str(&name, RUN_TIMESTAMP_FORMAT) else {
                continue;
            };
            if PipelineModel::exists(&entry.path().join(MODEL_DIR)) {
                runs.push(stamp);
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Model directory of the most recent saved run.
    pub fn latest_model_path(&self) -> Result<Option<PathBuf>, StageError> {
        Ok(self.saved_runs()?.last().map(|stamp| {
            self.save_model_path(&stamp.format(RUN_TIMESTAMP_FORMAT).to_string())
        }))
    }

    pub fn is_model_present(&self) -> Result<bool, StageError> {
        Ok(self.latest_model_path()?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn save(dir: &Path, name: &str) {
        PipelineModel::default()
            .save(&dir.join(name).join(MODEL_DIR))
            .unwrap();
    }

    #[test]
    fn missing_dir_has_no_model() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ModelResolver::new(dir.path().join("saved_models"));
        assert!(!resolver.is_model_present().unwrap());
        assert_eq!(resolver.latest_model_path().unwrap(), None);
    }

    #[test]
    fn latest_is_newest_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        save(dir.path(), "20230101_000000");
        save(dir.path(), "20230426_120000");
        save(dir.path(), "20221231_235959");
        // Not a timestamp, and a timestamped dir with no model inside.
        save(dir.path(), "scratch");
        fs::create_dir_all(dir.path().join("20240101_000000")).unwrap();

        let resolver = ModelResolver::new(dir.path());
        assert_eq!(resolver.saved_runs().unwrap().len(), 3);
        assert_eq!(
            resolver.latest_model_path().unwrap(),
            Some(dir.path().join("20230426_120000").join(MODEL_DIR))
        );
    }
}
