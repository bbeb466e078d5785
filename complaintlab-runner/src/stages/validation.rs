//! Data validation: missing-value report, column pruning, required-column check.

use crate::artifact::{DataIngestionArtifact, DataValidationArtifact};
use crate::config::DataValidationConfig;
use crate::error::StageError;
use crate::table::{column_names, write_parquet};
use complaintlab_core::ingest::FeatureStore;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Column added to rejected data explaining why it was dropped.
pub const ERROR_MESSAGE_COLUMN: &str = "error_msg";
const MISSING_DATA_DIR: &str = "missing_data";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingReport {
    pub total_row: usize,
    pub missing_row: usize,
    pub missing_percentage: f64,
}

pub struct DataValidation {
    config: DataValidationConfig,
    ingestion: DataIngestionArtifact,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig, ingestion: DataIngestionArtifact) -> Self {
        Self { config, ingestion }
    }

    /// First `max_rows` rows of the feature store.
    pub fn read_data(&self) -> Result<DataFrame, StageError> {
        let store = FeatureStore::new(&self.ingestion.feature_store_path);
        let df = store.read(Some(self.config.max_rows))?;
        if df.height() == 0 {
            return Err(StageError::Contract(format!(
                "feature store {} holds no rows",
                self.ingestion.feature_store_path.display()
            )));
        }
        info!(rows = df.height(), columns = df.width(), "read feature store");
        Ok(df)
    }

    pub fn missing_report(df: &DataFrame) -> BTreeMap<String, MissingReport> {
        let total_row = df.height();
        df.get_columns()
            .iter()
            .map(|column| {
                let missing_row = column.null_count();
                let missing_percentage = if total_row == 0 {
                    0.0
                } else {
                    missing_row as f64 * 100.0 / total_row as f64
                };
                (
                    column.name().to_string(),
                    MissingReport {
                        total_row,
                        missing_row,
                        missing_percentage,
                    },
                )
            })
            .collect()
    }

    /// Present columns that are unwanted by schema or missing more than the
    /// threshold allows.
    pub fn unwanted_columns(&self, df: &DataFrame) -> BTreeSet<String> {
        let present: BTreeSet<String> = column_names(df).into_iter().collect();
        let limit = self.config.missing_threshold * 100.0;

        let mut unwanted: BTreeSet<String> = self
            .config
            .schema
            .unwanted_columns
            .iter()
            .filter(|c| present.contains(*c))
            .cloned()
            .collect();
        for (column, report) in Self::missing_report(df) {
            if report.missing_percentage > limit {
                unwanted.insert(column);
            }
        }
        unwanted
    }

    /// Write the unwanted columns to the rejected area and return the rest.
    pub fn drop_unwanted_columns(&self, df: DataFrame) -> Result<DataFrame, StageError> {
        let unwanted = self.unwanted_columns(&df);
        if unwanted.is_empty() {
            return Ok(df);
        }
        info!(columns = ?unwanted, "dropping columns");

        let mut rejected = df.select(unwanted.iter().map(String::as_str))?;
        rejected.with_column(Column::new(
            ERROR_MESSAGE_COLUMN.into(),
            vec!["Contains many missing values"; df.height()],
        ))?;
        let rejected_path = self
            .config
            .rejected_data_dir
            .join(MISSING_DATA_DIR)
            .join(format!("{}.parquet", self.config.file_name));
        write_parquet(&mut rejected, &rejected_path).map_err(StageError::table(&rejected_path))?;

        let keep: Vec<String> = column_names(&df)
            .into_iter()
            .filter(|c| !unwanted.contains(c))
            .collect();
        Ok(df.select(keep)?)
    }

    pub fn check_required_columns(&self, df: &DataFrame) -> Result<(), StageError> {
        let present: BTreeSet<String> = column_names(df).into_iter().collect();
        let missing: Vec<String> = self
            .config
            .schema
            .required_columns()
            .into_iter()
            .filter(|c| !present.contains(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(StageError::Contract(format!(
                "required columns missing: {}; found: {}",
                missing.join(", "),
                present.into_iter().collect::<Vec<_>>().join(", ")
            )))
        }
    }

    pub fn initiate(self) -> Result<DataValidationArtifact, StageError> {
        info!("starting data validation");
        let df = self.read_data()?;
        let mut df = self.drop_unwanted_columns(df)?;
        self.check_required_columns(&df)?;

        let accepted_file_path = self
            .config
            .accepted_data_dir
            .join(format!("{}.parquet", self.config.file_name));
        write_parquet(&mut df, &accepted_file_path)
            .map_err(StageError::table(&accepted_file_path))?;

        let artifact = DataValidationArtifact {
            accepted_file_path,
            rejected_dir: self.config.rejected_data_dir,
        };
        info!(?artifact, rows = df.height(), "data validation finished");
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ComplaintSchema;
    use crate::table::read_parquet;
    use std::path::Path;

    fn config(dir: &Path) -> DataValidationConfig {
        DataValidationConfig {
            accepted_data_dir: dir.join("accepted_data"),
            rejected_data_dir: dir.join("rejected_data"),
            file_name: "finance_complaint".into(),
            max_rows: 100,
            missing_threshold: 0.2,
            schema: ComplaintSchema::default(),
        }
    }

    fn stage(dir: &Path) -> DataValidation {
        DataValidation::new(
            config(dir),
            DataIngestionArtifact {
                feature_store_path: dir.join("fs"),
                download_dir: dir.join("dl"),
                metadata_file_path: dir.join("meta_info.yaml"),
            },
        )
    }

    fn frame(rows: usize, sparse_missing: usize) -> DataFrame {
        let text = |v: &str| vec![Some(v.to_string()); rows];
        let mut sparse = vec![Some("x".to_string()); rows];
        for slot in sparse.iter_mut().take(sparse_missing) {
            *slot = None;
        }
        DataFrame::new(vec![
            Column::new("company_response".into(), text("Closed")),
            Column::new("consumer_consent_provided".into(), text("Yes")),
            Column::new("submitted_via".into(), text("Web")),
            Column::new("issue".into(), text("Fees")),
            Column::new("date_received".into(), text("2022-07-01")),
            Column::new("date_sent_to_company".into(), text("2022-07-02")),
            Column::new("consumer_disputed".into(), text("No")),
            Column::new("complaint_id".into(), text("1")),
            Column::new("tags".into(), sparse),
        ])
        .unwrap()
    }

    #[test]
    fn missing_report_counts_nulls() {
        let report = DataValidation::missing_report(&frame(10, 3));
        assert_eq!(report["tags"].missing_row, 3);
        assert!((report["tags"].missing_percentage - 30.0).abs() < 1e-12);
        assert_eq!(report["issue"].missing_row, 0);
        assert_eq!(report["issue"].total_row, 10);
    }

    #[test]
    fn unwanted_includes_schema_and_sparse_columns() {
        let dir = tempfile::tempdir().unwrap();
        let unwanted = stage(dir.path()).unwanted_columns(&frame(10, 3));
        let expected: BTreeSet<String> = ["complaint_id", "tags"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unwanted, expected);

        // Exactly at the threshold is kept.
        let unwanted = stage(dir.path()).unwanted_columns(&frame(10, 2));
        assert!(!unwanted.contains("tags"));
    }

    #[test]
    fn dropped_columns_are_written_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let kept = stage(dir.path())
            .drop_unwanted_columns(frame(10, 5))
            .unwrap();

        assert!(kept.column("tags").is_err());
        assert!(kept.column("complaint_id").is_err());
        assert_eq!(kept.width(), 7);

        let rejected = read_parquet(
            &dir.path()
                .join("rejected_data/missing_data/finance_complaint.parquet"),
        )
        .unwrap();
        assert_eq!(rejected.width(), 3);
        assert!(rejected.column(ERROR_MESSAGE_COLUMN).is_ok());
    }

    #[test]
    fn missing_required_column_is_contract_error() {
        let dir = tempfile::tempdir().unwrap();
        let df = frame(4, 0).drop("issue").unwrap();
        let err = stage(dir.path()).check_required_columns(&df).unwrap_err();
        assert!(matches!(err, StageError::Contract(msg) if msg.contains("issue")));
    }
}
