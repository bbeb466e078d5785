//! Ingestion metadata: the single latest successfully ingested window.
//!
//! The file is overwritten on every successful run (no history). It is the
//! resume point for the next run: `from_date` of the next run is forced to
//! the recorded `to_date`.
//!
//! Content is a flat YAML mapping.

use super::error::IngestError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const METADATA_FILE_NAME: &str = "meta_info.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionMetadataRecord {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub data_file_path: PathBuf,
    pub written_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct IngestionMetadataStore {
    path: PathBuf,
}

impl IngestionMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn read(&self) -> Result<IngestionMetadataRecord, IngestError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(IngestError::MetadataNotFound {
                    path: self.path.clone(),
                })
            }
            Err(e) => {
                return Err(IngestError::Filesystem {
                    context: format!("reading {}", self.path.display()),
                    source: e,
                })
            }
        };
        serde_yaml::from_str(&content).map_err(|source| IngestError::Metadata {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the stored record. Written to a temp file then renamed into
    /// place so a crash never leaves a half-written resume point.
    pub fn write(
        &self,
        from_date: NaiveDate,
        to_date: NaiveDate,
        data_file_path: &Path,
    ) -> Result<IngestionMetadataRecord, IngestError> {
        let record = IngestionMetadataRecord {
            from_date,
            to_date,
            data_file_path: data_file_path.to_path_buf(),
            written_at: chrono::Local::now().naive_local(),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(IngestError::fs(format!("creating {}", parent.display())))?;
        }

        let content = serde_yaml::to_string(&record).map_err(|source| {
            IngestError::Metadata {
                path: self.path.clone(),
                source,
            }
        })?;
        let tmp_path = self.path.with_extension("yaml.tmp");
        fs::write(&tmp_path, content)
            .map_err(IngestError::fs(format!("writing {}", tmp_path.display())))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            IngestError::Filesystem {
                context: format!("replacing {}", self.path.display()),
                source: e,
            }
        })?;

        tracing::info!(
            path = %self.path.display(),
            %from_date,
            %to_date,
            "wrote ingestion metadata"
        );
        Ok(record)
    }
}
