//! Keyed artifact handoff between separately scheduled tasks.
//!
//! Each task pushes its artifact under a well-known key and the next task
//! pulls it. Values are JSON files at `<handoff_dir>/<key>.json`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DATA_INGESTION_KEY: &str = "data_ingestion_artifact";
pub const DATA_VALIDATION_KEY: &str = "data_validation_artifact";
pub const DATA_TRANSFORMATION_KEY: &str = "data_transformation_artifact";
pub const MODEL_TRAINER_KEY: &str = "model_trainer_artifact";
pub const MODEL_EVALUATION_KEY: &str = "model_evaluation_artifact";
pub const MODEL_PUSHER_KEY: &str = "model_pusher_artifact";

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("no artifact under key '{key}' in {}", dir.display())]
    Missing { key: String, dir: PathBuf },
    #[error("handoff I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact under key '{key}' is invalid: {source}")]
    Format {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ArtifactHandoff {
    dir: PathBuf,
}

impl ArtifactHandoff {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).is_file()
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn push<T: Serialize>(&self, key: &str, value: &T) -> Result<PathBuf, HandoffError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| HandoffError::Io { path, source }
        };
        fs::create_dir_all(&self.dir).map_err(io(&self.dir))?;

        let path = self.path_for(key);
        let json = serde_json::to_string_pretty(value).map_err(|source| HandoffError::Format {
            key: key.to_string(),
            source,
        })?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io(&tmp_path))?;
        fs::rename(&tmp_path, &path).map_err(io(&path))?;

        tracing::debug!(key, path = %path.display(), "pushed artifact");
        Ok(path)
    }

    pub fn pull<T: DeserializeOwned>(&self, key: &str) -> Result<T, HandoffError> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HandoffError::Missing {
                    key: key.to_string(),
                    dir: self.dir.clone(),
                })
            }
            Err(source) => return Err(HandoffError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| HandoffError::Format {
            key: key.to_string(),
            source,
        })
    }
}
