//! Quality validation over transformed files: type, range, completeness,
//! and hourly-gap checks, reported as one CSV row per file.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::batch;
use crate::config::SensorConfig;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::timestamps;

const SECONDS_PER_HOUR: i64 = 3600;

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub file_name: String,
    pub total_records: i64,
    pub invalid_value_type: i64,
    pub invalid_timestamp: i64,
    #[serde(rename = "outlier_%")]
    pub outlier_pct: String,
    #[serde(rename = "missing_%")]
    pub missing_pct: String,
    pub sensors_with_gaps: i64,
    pub total_missing_hours: i64,
}

impl QualityReport {
    /// Partial row for a file whose validation itself failed: numeric
    /// fields carry the sentinel `-1`, the map columns carry the cause.
    fn failed(file_name: String, err: &PipelineError) -> Self {
        let cause = json!({ "error": err.to_string() }).to_string();
        QualityReport {
            file_name,
            total_records: -1,
            invalid_value_type: -1,
            invalid_timestamp: -1,
            outlier_pct: cause.clone(),
            missing_pct: cause,
            sensors_with_gaps: -1,
            total_missing_hours: -1,
        }
    }
}

/// Validates every transformed file and writes the consolidated report
/// atomically, exactly once. Per-file failures produce a sentinel row and
/// never halt the stage.
pub fn run(ctx: &PipelineContext) -> Result<Vec<QualityReport>> {
    let files = transformed_files(&ctx.paths.transformed_dir)?;
    if files.is_empty() {
        warn!("no transformed files found; run transformation first");
        return Ok(Vec::new());
    }

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("unknown")
            .to_string();
        info!(file = %file_name, "validating");
        let report = match validate_file(&path, &ctx.config) {
            Ok(mut report) => {
                report.file_name = file_name;
                report
            }
            Err(err) => {
                error!(file = %file_name, %err, "validation failed");
                QualityReport::failed(file_name, &err)
            }
        };
        reports.push(report);
    }

    let report_path = ctx.paths.quality_report_path();
    write_report_atomic(&reports, &report_path)?;
    info!(report = %report_path.display(), files = reports.len(), "quality report written");
    Ok(reports)
}

/// Runs all checks against a single transformed file. `file_name` is left
/// empty for the caller to fill.
pub fn validate_file(path: &Path, config: &SensorConfig) -> Result<QualityReport> {
    let df = batch::read_parquet(path)?;
    let total_records = df.height() as i64;

    let invalid_value_type = count_invalid_value_type(&df)?;

    let reading_types = batch::string_column(&df, "reading_type")?;
    let values = batch::float_column(&df, "value")?;
    let value_nulls: Vec<bool> = null_mask(&df, "value")?;

    // Range and completeness per reading type present in the file.
    let mut per_type_totals: BTreeMap<&str, i64> = BTreeMap::new();
    let mut per_type_out_of_range: BTreeMap<&str, i64> = BTreeMap::new();
    let mut per_type_missing: BTreeMap<&str, i64> = BTreeMap::new();
    for idx in 0..df.height() {
        let Some(rt) = reading_types[idx].as_deref() else {
            continue;
        };
        *per_type_totals.entry(rt).or_insert(0) += 1;
        if value_nulls[idx] {
            *per_type_missing.entry(rt).or_insert(0) += 1;
        }
        if let Some(v) = values[idx] {
            let (low, high) = config.limits(rt);
            if v < low || v > high {
                *per_type_out_of_range.entry(rt).or_insert(0) += 1;
            }
        }
    }

    let mut outlier_pct: BTreeMap<String, f64> = BTreeMap::new();
    let mut missing_pct: BTreeMap<String, f64> = BTreeMap::new();
    for (rt, total) in &per_type_totals {
        let outliers = per_type_out_of_range.get(rt).copied().unwrap_or(0);
        let missing = per_type_missing.get(rt).copied().unwrap_or(0);
        let pct = |count: i64| {
            if *total == 0 {
                0.0
            } else {
                round2(100.0 * count as f64 / *total as f64)
            }
        };
        outlier_pct.insert(rt.to_string(), pct(outliers));
        missing_pct.insert(rt.to_string(), pct(missing));
    }

    // Timestamp validity and hourly coverage share one parsing pass.
    let sensor_ids = batch::string_column(&df, "sensor_id")?;
    let raw_timestamps = batch::string_column(&df, "timestamp")?;
    let mut invalid_timestamp = 0i64;
    let mut hours_by_sensor: HashMap<&str, HashSet<i64>> = HashMap::new();
    for idx in 0..df.height() {
        let parsed = raw_timestamps[idx]
            .as_deref()
            .and_then(timestamps::parse_flexible);
        let Some(dt) = parsed else {
            invalid_timestamp += 1;
            continue;
        };
        if let Some(sensor) = sensor_ids[idx].as_deref() {
            let hour = dt.and_utc().timestamp().div_euclid(SECONDS_PER_HOUR);
            hours_by_sensor.entry(sensor).or_default().insert(hour);
        }
    }

    let mut sensors_with_gaps = 0i64;
    let mut total_missing_hours = 0i64;
    for covered in hours_by_sensor.values() {
        let (Some(first), Some(last)) = (covered.iter().min(), covered.iter().max()) else {
            continue;
        };
        let expected = last - first + 1;
        let missing = expected - covered.len() as i64;
        if missing > 0 {
            sensors_with_gaps += 1;
            total_missing_hours += missing;
        }
    }

    Ok(QualityReport {
        file_name: String::new(),
        total_records,
        invalid_value_type,
        invalid_timestamp,
        outlier_pct: serde_json::to_string(&outlier_pct)?,
        missing_pct: serde_json::to_string(&missing_pct)?,
        sensors_with_gaps,
        total_missing_hours,
    })
}

/// Rows whose `value` is present but does not represent a 64-bit float. A
/// native float column (including its nulls) is always valid; nulls in a
/// non-float column are missing data, not type errors.
fn count_invalid_value_type(df: &DataFrame) -> Result<i64> {
    let column = df.column("value")?;
    if matches!(
        column.dtype(),
        DataType::Float64 | DataType::Float32 | DataType::Int64 | DataType::Int32
    ) {
        return Ok(0);
    }
    let originally_null = null_mask(df, "value")?;
    let cast = batch::float_column(df, "value")?;
    let mut invalid = 0i64;
    for idx in 0..df.height() {
        if cast[idx].is_none() && !originally_null[idx] {
            invalid += 1;
        }
    }
    Ok(invalid)
}

fn null_mask(df: &DataFrame, name: &str) -> Result<Vec<bool>> {
    let column = df.column(name)?;
    Ok((0..df.height())
        .map(|idx| column.get(idx).map(|v| v.is_null()).unwrap_or(true))
        .collect())
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

fn write_report_atomic(reports: &[QualityReport], path: &Path) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PipelineError::Processing(format!("invalid report path: {}", path.display()))
        })?;
    let tmp_path = match parent {
        Some(parent) => parent.join(format!("{file_name}.tmp")),
        None => PathBuf::from(format!("{file_name}.tmp")),
    };

    let mut writer = csv::Writer::from_writer(File::create(&tmp_path)?);
    for report in reports {
        writer.serialize(report)?;
    }
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| {
        PipelineError::Processing(format!("failed to flush quality report: {err}"))
    })?;
    file.sync_all()?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
