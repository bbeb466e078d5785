//! Pipeline settings: one immutable object read from TOML, every field
//! defaulted, plus the handful of values that come from the environment.

use crate::schema::ComplaintSchema;
use complaintlab_core::ingest::IngestionSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Directory name under `artifact_root` holding all runs.
    pub pipeline_name: String,
    /// Root of every artifact, and of `saved_models/`.
    pub artifact_root: PathBuf,
    pub ingestion: IngestionSettings,
    pub validation: ValidationSettings,
    pub transformation: TransformationSettings,
    pub evaluation: EvaluationSettings,
    pub schema: ComplaintSchema,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pipeline_name: "artifact".to_string(),
            artifact_root: PathBuf::from("."),
            ingestion: IngestionSettings::default(),
            validation: ValidationSettings::default(),
            transformation: TransformationSettings::default(),
            evaluation: EvaluationSettings::default(),
            schema: ComplaintSchema::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    /// Rows read from the feature store.
    pub max_rows: usize,
    /// Fraction of missing values above which a column is dropped.
    pub missing_threshold: f64,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            missing_threshold: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformationSettings {
    pub test_size: f64,
    /// Seed for the train/test split.
    pub seed: u64,
}

impl Default for TransformationSettings {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    /// Minimum f1 gain over the served model required for acceptance.
    pub change_threshold: f64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            change_threshold: 0.02,
        }
    }
}

impl PipelineSettings {
    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "pipeline_name",
                reason: "must not be empty".into(),
            });
        }
        let test_size = self.transformation.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(ConfigError::Invalid {
                field: "transformation.test_size",
                reason: format!("must be in (0, 1), got {test_size}"),
            });
        }
        let threshold = self.validation.missing_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Invalid {
                field: "validation.missing_threshold",
                reason: format!("must be in [0, 1], got {threshold}"),
            });
        }
        if self.validation.max_rows == 0 {
            return Err(ConfigError::Invalid {
                field: "validation.max_rows",
                reason: "must be positive".into(),
            });
        }
        if !(self.evaluation.change_threshold >= 0.0) {
            return Err(ConfigError::Invalid {
                field: "evaluation.change_threshold",
                reason: format!("must be non-negative, got {}", self.evaluation.change_threshold),
            });
        }
        if self.schema.target_column.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "schema.target_column",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Serialize the settings to TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Deployment values read from the environment. Reported by `status`; the
/// pipeline itself does not need them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvironmentSettings {
    pub mongo_db_url: Option<String>,
    pub bucket_name: Option<String>,
}

impl EnvironmentSettings {
    pub const MONGO_DB_URL: &'static str = "MONGO_DB_URL";
    pub const BUCKET_NAME: &'static str = "BUCKET_NAME";

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            mongo_db_url: get(Self::MONGO_DB_URL),
            bucket_name: get(Self::BUCKET_NAME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn empty_toml_gives_defaults() {
        let settings = PipelineSettings::from_toml("").unwrap();
        assert_eq!(settings, PipelineSettings::default());
        assert_eq!(settings.validation.max_rows, 10_000);
        assert_eq!(settings.ingestion.min_start_date, "2019-01-01");
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let settings = PipelineSettings::from_toml(
            r#"
            pipeline_name = "nightly"

            [ingestion]
            from_date = "2022-07-01"
            retry_budget = 2

            [transformation]
            test_size = 0.3
            "#,
        )
        .unwrap();

        assert_eq!(settings.pipeline_name, "nightly");
        assert_eq!(settings.ingestion.from_date.as_deref(), Some("2022-07-01"));
        assert_eq!(settings.ingestion.retry_budget, 2);
        assert_eq!(settings.ingestion.file_name, "finance_complaint");
        assert!((settings.transformation.test_size - 0.3).abs() < 1e-12);
        assert_eq!(settings.transformation.seed, 42);
    }

    #[test]
    fn invalid_test_size_is_rejected() {
        let err = PipelineSettings::from_toml("[transformation]\ntest_size = 1.5").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "transformation.test_size",
                ..
            }
        ));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = PipelineSettings::from_toml("pipeline_name = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn toml_roundtrip() {
        let settings = PipelineSettings::default();
        let text = settings.to_toml().unwrap();
        assert_eq!(PipelineSettings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn environment_lookup_ignores_blank_values() {
        let vars: HashMap<&str, &str> =
            [("MONGO_DB_URL", "mongodb://db:27017"), ("BUCKET_NAME", "  ")].into();
        let env = EnvironmentSettings::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.mongo_db_url.as_deref(), Some("mongodb://db:27017"));
        assert_eq!(env.bucket_name, None);
    }
}
