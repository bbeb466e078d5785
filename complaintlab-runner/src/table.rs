//! Parquet I/O and column extraction helpers.
//!
//! Stages move whole tables through Parquet files; per-row work happens on
//! plain vectors pulled out of the frame.

use polars::prelude::*;
use std::fs;
use std::path::Path;

/// Read a single Parquet file.
pub fn read_parquet(path: &Path) -> PolarsResult<DataFrame> {
    let file = fs::File::open(path)?;
    ParquetReader::new(file).finish()
}

/// Write `df` to `path`, creating parent directories. Written to a `.tmp`
/// sibling first and renamed into place.
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> PolarsResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp_path)?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Values of `name` as optional strings. Non-string columns are cast.
pub fn string_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Values of `name` as optional floats. Non-float columns are cast.
pub fn f64_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Values of `name` as optional category indices.
pub fn index_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<u32>>> {
    let column = df.column(name)?.cast(&DataType::UInt32)?;
    Ok(column.u32()?.into_iter().collect())
}

/// Replace (or add) a column.
pub fn put_column(df: &mut DataFrame, column: Column) -> PolarsResult<()> {
    df.with_column(column)?;
    Ok(())
}

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|c| c.as_str().to_string())
        .collect()
}

/// Rows at `indices`, in that order.
pub fn take_rows(df: &DataFrame, indices: &[u32]) -> PolarsResult<DataFrame> {
    let idx = IdxCa::from_vec("idx".into(), indices.iter().map(|&i| i as IdxSize).collect());
    df.take(&idx)
}
