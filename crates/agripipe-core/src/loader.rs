//! Load stage: republish transformed batches into the hive-partitioned
//! analytics dataset, partitioned by (date, sensor_id) and compressed
//! with Snappy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use polars::io::parquet::write::ParquetCompression;
use polars::prelude::*;
use tracing::{info, warn};

use crate::batch;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::timestamps;

const UNKNOWN_PARTITION: &str = "unknown";

#[derive(Debug, Default, Clone, Copy)]
pub struct LoadSummary {
    pub files_loaded: usize,
    pub partitions_written: usize,
}

pub fn run(ctx: &PipelineContext) -> Result<LoadSummary> {
    let files = transformed_files(&ctx.paths.transformed_dir)?;
    if files.is_empty() {
        warn!("no transformed files found; nothing to load");
        return Ok(LoadSummary::default());
    }

    let mut summary = LoadSummary::default();
    for path in files {
        info!(file = %path.display(), "loading");
        summary.partitions_written += load_file(&path, &ctx.paths.analytics_dir)?;
        summary.files_loaded += 1;
    }

    info!(
        files = summary.files_loaded,
        partitions = summary.partitions_written,
        dataset = %ctx.paths.analytics_dir.display(),
        "load complete"
    );
    Ok(summary)
}

/// Appends one batch to the dataset: one part file per (date, sensor_id)
/// partition touched by the input, numbered past any existing part files.
pub fn load_file(path: &Path, analytics_dir: &Path) -> Result<usize> {
    let df = batch::read_parquet(path)?;
    if df.height() == 0 {
        warn!(file = %path.display(), "transformed file is empty, skipping");
        return Ok(0);
    }

    let dates = partition_dates(&df, path)?;
    let sensors = batch::string_column(&df, "sensor_id")?;

    let mut partitions: BTreeMap<(String, String), Vec<IdxSize>> = BTreeMap::new();
    for idx in 0..df.height() {
        let sensor = sensors[idx]
            .clone()
            .unwrap_or_else(|| UNKNOWN_PARTITION.to_string());
        partitions
            .entry((dates[idx].clone(), sensor))
            .or_default()
            .push(idx as IdxSize);
    }

    // Partition key columns are encoded in the directory names, hive
    // style, and dropped from the part files themselves.
    let mut payload = df;
    for column in ["date", "sensor_id"] {
        if payload.get_column_names().iter().any(|c| c.as_str() == column) {
            payload = payload.drop(column)?;
        }
    }

    let mut written = 0usize;
    for ((date, sensor), indices) in partitions {
        let take = IdxCa::from_vec("take".into(), indices);
        let mut part = payload.take(&take)?;

        let dir = analytics_dir
            .join(format!("date={date}"))
            .join(format!("sensor_id={sensor}"));
        fs::create_dir_all(&dir)?;
        let part_path = dir.join(format!("part-{}.parquet", next_sequence(&dir)?));
        batch::write_parquet_atomic(&mut part, &part_path, ParquetCompression::Snappy)?;
        info!(
            partition = %dir.display(),
            part = %part_path.display(),
            rows = part.height(),
            "partition written"
        );
        written += 1;
    }
    Ok(written)
}

/// Per-row partition date derived from `timestamp`. A file without the
/// column loads under `date=unknown`, as do rows that fail to parse.
fn partition_dates(df: &DataFrame, path: &Path) -> Result<Vec<String>> {
    let has_timestamp = df
        .get_column_names()
        .iter()
        .any(|c| c.as_str() == "timestamp");
    if !has_timestamp {
        warn!(
            file = %path.display(),
            "missing timestamp column, loading under date=unknown"
        );
        return Ok(vec![UNKNOWN_PARTITION.to_string(); df.height()]);
    }

    let raw = batch::string_column(df, "timestamp")?;
    Ok(raw
        .iter()
        .map(|value| {
            value
                .as_deref()
                .and_then(timestamps::parse_flexible)
                .map(|dt| dt.date().format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| UNKNOWN_PARTITION.to_string())
        })
        .collect())
}

/// First unused part number in a partition directory.
fn next_sequence(dir: &Path) -> Result<u64> {
    let mut next = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(seq) = name
            .strip_prefix("part-")
            .and_then(|rest| rest.strip_suffix(".parquet"))
            .and_then(|digits| digits.parse::<u64>().ok())
        {
            next = next.max(seq + 1);
        }
    }
    Ok(next)
}

fn transformed_files(transformed_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = transformed_dir.join("*_transformed.parquet");
    let pattern = pattern.to_str().ok_or_else(|| {
        PipelineError::Processing(format!(
            "transformed directory path is not valid UTF-8: {}",
            transformed_dir.display()
        ))
    })?;

    let mut files = Vec::new();
    for entry in glob::glob(pattern)
        .map_err(|err| PipelineError::Processing(format!("invalid file pattern: {err}")))?
    {
        if let Ok(path) = entry {
            if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}
