//! Cheap structural validation of raw files. Reads only the parquet
//! schema, never the row groups.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub const REQUIRED_COLUMNS: [&str; 5] = [
    "sensor_id",
    "timestamp",
    "reading_type",
    "value",
    "battery_level",
];

#[derive(Debug, Clone)]
pub struct SchemaReport {
    pub ok: bool,
    pub columns: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

/// Inspects a file's column names. Missing required columns fail the
/// report; extra columns are surfaced but do not.
pub fn inspect(path: &Path) -> Result<SchemaReport> {
    let file = File::open(path).map_err(|err| PipelineError::FileRead {
        file: path.display().to_string(),
        reason: err.to_string(),
    })?;
    let mut reader = ParquetReader::new(file);
    let schema = reader.schema().map_err(|err| PipelineError::FileRead {
        file: path.display().to_string(),
        reason: err.to_string(),
    })?;

    let columns: Vec<String> = schema.iter_names().map(|name| name.to_string()).collect();
    let present: BTreeSet<&str> = columns.iter().map(String::as_str).collect();

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| !present.contains(**required))
        .map(|required| required.to_string())
        .collect();
    let mut extra: Vec<String> = columns
        .iter()
        .filter(|column| !REQUIRED_COLUMNS.contains(&column.as_str()))
        .cloned()
        .collect();
    extra.sort();

    Ok(SchemaReport {
        ok: missing.is_empty(),
        columns,
        missing,
        extra,
    })
}
