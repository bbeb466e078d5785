//! Data transformation: seeded train/test split, feature pipeline fit,
//! transformed tables and the exported pipeline.

use crate::artifact::{DataTransformationArtifact, DataValidationArtifact};
use crate::config::DataTransformationConfig;
use crate::engine::MlEngine;
use crate::error::StageError;
use crate::table::{has_column, read_parquet, take_rows, write_parquet};
use polars::prelude::DataFrame;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;

pub struct DataTransformation {
    config: DataTransformationConfig,
    validation: DataValidationArtifact,
    engine: Arc<dyn MlEngine>,
}

impl DataTransformation {
    pub fn new(
        config: DataTransformationConfig,
        validation: DataValidationArtifact,
        engine: Arc<dyn MlEngine>,
    ) -> Self {
        Self {
            config,
            validation,
            engine,
        }
    }

    pub fn read_data(&self) -> Result<DataFrame, StageError> {
        let path = &self.validation.accepted_file_path;
        read_parquet(path).map_err(StageError::table(path))
    }

    /// Each row lands in test with probability `test_size`. The same seed
    /// and row count always give the same split.
    pub fn split(
        df: &DataFrame,
        test_size: f64,
        seed: u64,
    ) -> Result<(DataFrame, DataFrame), StageError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut train = Vec::new();
        let mut test = Vec::new();
        for row in 0..df.height() as u32 {
            if rng.gen::<f64>() < test_size {
                test.push(row);
            } else {
                train.push(row);
            }
        }
        Ok((take_rows(df, &train)?, take_rows(df, &test)?))
    }

    pub fn initiate(self) -> Result<DataTransformationArtifact, StageError> {
        info!("starting data transformation");
        let schema = &self.config.schema;
        let df = self.read_data()?;

        let (train, test) = Self::split(&df, self.config.test_size, self.config.seed)?;
        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            test_size = self.config.test_size,
            "split dataset"
        );
        if train.height() == 0 {
            return Err(StageError::Contract("train split is empty".into()));
        }

        let pipeline = self.engine.fit_feature_pipeline(&train, schema)?;
        let columns = schema.transformed_columns();

        let transformed_train = pipeline.transform(&train)?;
        if !has_column(&transformed_train, &schema.target_column) {
            return Err(StageError::Contract(format!(
                "target column '{}' missing after transformation",
                schema.target_column
            )));
        }
        let mut transformed_train = transformed_train.select(columns.clone())?;
        let mut transformed_test = pipeline.transform(&test)?.select(columns)?;

        pipeline.save(&self.config.export_pipeline_dir)?;

        let file_name = format!("{}.parquet", self.config.file_name);
        let transformed_train_path = self.config.transformed_train_dir.join(&file_name);
        let transformed_test_path = self.config.transformed_test_dir.join(&file_name);
        write_parquet(&mut transformed_train, &transformed_train_path)
            .map_err(StageError::table(&transformed_train_path))?;
        write_parquet(&mut transformed_test, &transformed_test_path)
            .map_err(StageError::table(&transformed_test_path))?;

        let artifact = DataTransformationArtifact {
            transformed_train_path,
            transformed_test_path,
            exported_pipeline_path: self.config.export_pipeline_dir,
        };
        info!(?artifact, engine = self.engine.name(), "data transformation finished");
        Ok(artifact)
    }
}
