//! Columnar feature store shared across runs.
//!
//! Layout: `{feature_store_dir}/{file_name}/part-{tag}-{hash}.parquet`
//!
//! - Appends add one Parquet part per downloaded shard; existing parts are
//!   never rewritten.
//! - `hash` is the BLAKE3 digest of the shard's JSON bytes. A shard whose
//!   digest is already present is not appended twice.
//! - Writes are atomic (write to .tmp, rename into place).
//! - Reads concatenate all parts diagonally, so shards whose records carry
//!   different field sets still load as one table. A column whose type
//!   differs between parts is read as text; an all-null column takes the
//!   type it has in the other parts.

use super::error::IngestError;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Hex characters of the content hash kept in part names.
const HASH_PREFIX_LEN: usize = 16;

/// What [`FeatureStore::append_shard`] did with a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { part: PathBuf, rows: usize },
    /// Same content already stored under `part`.
    Duplicate { part: PathBuf },
    /// Shard holds no records.
    Empty,
}

#[derive(Debug, Clone)]
pub struct FeatureStore {
    root: PathBuf,
}

impl FeatureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the parts; this is the feature-store path handed to
    /// downstream stages.
    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Part files, sorted by name.
    pub fn part_paths(&self) -> Result<Vec<PathBuf>, IngestError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root)
            .map_err(IngestError::fs(format!("listing {}", self.root.display())))?;

        let mut parts = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(IngestError::fs(format!("listing {}", self.root.display())))?
                .path();
            if path.extension().and_then(|e| e.to_str()) == Some("parquet") {
                parts.push(path);
            }
        }
        parts.sort();
        Ok(parts)
    }

    pub fn part_count(&self) -> Result<usize, IngestError> {
        Ok(self.part_paths()?.len())
    }

    /// Convert one downloaded JSON shard and append it as a new part.
    pub fn append_shard(&self, shard: &Path, tag: &str) -> Result<AppendOutcome, IngestError> {
        let bytes =
            fs::read(shard).map_err(IngestError::fs(format!("reading {}", shard.display())))?;

        let records: Vec<serde_json::Value> =
            serde_json::from_slice(&bytes).map_err(|e| IngestError::Serialization(format!(
                "shard {} is not a record array: {e}",
                shard.display()
            )))?;
        if records.is_empty() {
            return Ok(AppendOutcome::Empty);
        }

        let digest = blake3::hash(&bytes).to_hex();
        let digest = &digest.as_str()[..HASH_PREFIX_LEN];
        if let Some(part) = self.find_part_with_digest(digest)? {
            return Ok(AppendOutcome::Duplicate { part });
        }

        let file = fs::File::open(shard)
            .map_err(IngestError::fs(format!("opening {}", shard.display())))?;
        let mut df = JsonReader::new(file)
            .finish()
            .map_err(IngestError::store(format!("parsing {}", shard.display())))?;

        fs::create_dir_all(&self.root)
            .map_err(IngestError::fs(format!("creating {}", self.root.display())))?;
        let part = self.root.join(format!("part-{tag}-{digest}.parquet"));
        write_parquet_atomic(&mut df, &part)?;

        Ok(AppendOutcome::Appended {
            part,
            rows: df.height(),
        })
    }

    /// Load the whole store (or its first `limit` rows).
    pub fn read(&self, limit: Option<usize>) -> Result<DataFrame, IngestError> {
        let parts = self.part_paths()?;
        let mut frames = Vec::with_capacity(parts.len());
        for part in &parts {
            let file = fs::File::open(part)
                .map_err(IngestError::fs(format!("opening {}", part.display())))?;
            let df = ParquetReader::new(file)
                .finish()
                .map_err(IngestError::store(format!("reading {}", part.display())))?;
            frames.push(df);
        }

        let df = match frames.len() {
            0 => DataFrame::empty(),
            1 => frames.remove(0),
            _ => {
                reconcile_dtypes(&mut frames)
                    .map_err(IngestError::store("reconciling part schemas"))?;
                polars::functions::concat_df_diagonal(&frames)
                    .map_err(IngestError::store("concatenating parts"))?
            }
        };

        Ok(match limit {
            Some(n) => df.head(Some(n)),
            None => df,
        })
    }

    fn find_part_with_digest(&self, digest: &str) -> Result<Option<PathBuf>, IngestError> {
        let suffix = format!("-{digest}.parquet");
        Ok(self.part_paths()?.into_iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&suffix))
        }))
    }
}

/// Cast every part's columns to one shared type per column name.
fn reconcile_dtypes(frames: &mut [DataFrame]) -> PolarsResult<()> {
    let mut targets: BTreeMap<String, DataType> = BTreeMap::new();
    for df in frames.iter() {
        for column in df.get_columns() {
            let dtype = column.dtype();
            if *dtype == DataType::Null {
                continue;
            }
            targets
                .entry(column.name().to_string())
                .and_modify(|target| {
                    if *target != *dtype {
                        *target = DataType::String;
                    }
                })
                .or_insert_with(|| dtype.clone());
        }
    }

    for df in frames.iter_mut() {
        for (name, target) in &targets {
            let cast = match df.column(name) {
                Ok(column) if column.dtype() != target => column.cast(target)?,
                _ => continue,
            };
            df.with_column(cast)?;
        }
    }
    Ok(())
}

fn write_parquet_atomic(df: &mut DataFrame, path: &Path) -> Result<(), IngestError> {
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)
        .map_err(IngestError::fs(format!("creating {}", tmp_path.display())))?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(IngestError::FeatureStore {
            context: format!("writing {}", tmp_path.display()),
            source: e,
        });
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        IngestError::Filesystem {
            context: format!("atomic rename to {}", path.display()),
            source: e,
        }
    })
}
