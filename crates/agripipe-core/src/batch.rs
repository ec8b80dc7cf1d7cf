//! Row-batch access helpers shared by the pipeline stages: parquet I/O
//! with atomic writes, and dtype-tolerant column extraction.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use polars::io::parquet::write::{ParquetCompression, ParquetWriter};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|err| PipelineError::FileRead {
        file: path.display().to_string(),
        reason: err.to_string(),
    })?;
    ParquetReader::new(file)
        .finish()
        .map_err(|err| PipelineError::FileRead {
            file: path.display().to_string(),
            reason: err.to_string(),
        })
}

/// Writes a parquet file via a temp path in the same directory, then
/// renames into place so readers never observe a partial file.
pub fn write_parquet_atomic(
    df: &mut DataFrame,
    path: &Path,
    compression: ParquetCompression,
) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PipelineError::Processing(format!("invalid output path: {}", path.display()))
        })?;
    let tmp_path = match parent {
        Some(parent) => parent.join(format!("{file_name}.tmp")),
        None => PathBuf::from(format!("{file_name}.tmp")),
    };

    let mut file = File::create(&tmp_path)?;
    ParquetWriter::new(&mut file)
        .with_compression(compression)
        .finish(df)?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Materializes a column as owned strings regardless of its physical
/// dtype. Datetime columns are rendered in the pipeline's canonical
/// `YYYY-MM-DDTHH:MM:SS` form so downstream parsing round-trips.
pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df.column(name)?;
    match column.dtype() {
        DataType::String => Ok(column
            .str()?
            .into_iter()
            .map(|value| value.map(str::to_string))
            .collect()),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let ca = column.datetime()?;
            Ok(ca
                .into_iter()
                .map(|value| value.and_then(|raw| format_datetime(raw, unit)))
                .collect())
        }
        _ => {
            let cast = column.cast(&DataType::String)?;
            Ok(cast
                .str()?
                .into_iter()
                .map(|value| value.map(str::to_string))
                .collect())
        }
    }
}

/// Materializes a column as `f64`, casting when necessary. Values that do
/// not convert come back as `None`.
pub fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let cast = df.column(name)?.cast(&DataType::Float64)?;
    Ok(cast.f64()?.into_iter().collect())
}

fn format_datetime(raw: i64, unit: TimeUnit) -> Option<String> {
    let micros = match unit {
        TimeUnit::Nanoseconds => raw / 1_000,
        TimeUnit::Microseconds => raw,
        TimeUnit::Milliseconds => raw.checked_mul(1_000)?,
    };
    naive_from_micros(micros).map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn naive_from_micros(value: i64) -> Option<NaiveDateTime> {
    let secs = value.div_euclid(1_000_000);
    let micros = value.rem_euclid(1_000_000) as u32;
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, micros * 1_000).map(|dt| dt.naive_utc())
}
