//! Ingestion stage: discover new raw files, gate them on schema, read,
//! profile, and republish as `_processed` parquet with checkpointing.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::io::parquet::write::ParquetCompression;
use polars::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::batch;
use crate::checkpoint::{CheckpointState, CheckpointStore, FileStatus};
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::ingest_log::{IngestionLog, IngestionLogEntry};
use crate::profiler;
use crate::scanner;
use crate::schema;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestionSummary {
    pub ingested: usize,
    pub quarantined: usize,
    pub failed: usize,
}

/// Processes every new raw file to a terminal outcome. File-level failures
/// quarantine the file and move on; only infrastructure errors (e.g. an
/// unwritable checkpoint) abort the stage.
pub fn run(ctx: &PipelineContext) -> Result<IngestionSummary> {
    let store = CheckpointStore::new(&ctx.paths.checkpoint_path);
    let mut state = store.load();
    let log = IngestionLog::new(ctx.paths.ingest_log_path());

    let files = scanner::list_new_files(&ctx.paths.raw_dir, &state)?;
    if files.is_empty() {
        info!("no new raw files to ingest");
        return Ok(IngestionSummary::default());
    }
    info!(count = files.len(), "found new raw files to ingest");

    let mut summary = IngestionSummary::default();
    for path in files {
        let outcome = ingest_file(ctx, &path, &mut state, &log)?;
        store.save(&state)?;
        match outcome {
            FileStatus::Success => summary.ingested += 1,
            FileStatus::Quarantined => summary.quarantined += 1,
            FileStatus::Failed => summary.failed += 1,
        }
    }

    info!(
        ingested = summary.ingested,
        quarantined = summary.quarantined,
        failed = summary.failed,
        "ingestion complete"
    );
    Ok(summary)
}

fn ingest_file(
    ctx: &PipelineContext,
    path: &Path,
    state: &mut CheckpointState,
    log: &IngestionLog,
) -> Result<FileStatus> {
    let started = Instant::now();
    let basename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            PipelineError::Processing(format!("raw file has no UTF-8 name: {}", path.display()))
        })?
        .to_string();
    info!(file = %basename, "ingesting");

    let checksum = sha256_file(path).ok();

    let report = match schema::inspect(path) {
        Ok(report) => report,
        Err(err) => {
            error!(file = %basename, %err, "could not inspect schema");
            return quarantine(
                ctx,
                path,
                &basename,
                checksum,
                FileStatus::Failed,
                err.to_string(),
                state,
                log,
                started,
            );
        }
    };
    if !report.ok {
        let err = PipelineError::SchemaMismatch {
            file: basename.clone(),
            missing: report.missing.clone(),
        };
        warn!(file = %basename, %err, "schema mismatch");
        return quarantine(
            ctx,
            path,
            &basename,
            checksum,
            FileStatus::Quarantined,
            err.to_string(),
            state,
            log,
            started,
        );
    }
    if !report.extra.is_empty() {
        warn!(file = %basename, extra = ?report.extra, "file carries extra columns");
    }

    let mut df = match batch::read_parquet(path) {
        Ok(df) => df,
        Err(err) => {
            error!(file = %basename, %err, "read failed");
            return quarantine(
                ctx,
                path,
                &basename,
                checksum,
                FileStatus::Failed,
                err.to_string(),
                state,
                log,
                started,
            );
        }
    };

    // An entirely-null numeric column cannot be imputed downstream; treat
    // it as a schema-like failure.
    if let Some(column) = all_null_column(&df) {
        warn!(file = %basename, column, "required column is entirely null");
        return quarantine(
            ctx,
            path,
            &basename,
            checksum,
            FileStatus::Quarantined,
            format!("column {column} is entirely null"),
            state,
            log,
            started,
        );
    }

    match profiler::profile(&df) {
        Ok(profile) => {
            info!(
                file = %basename,
                distinct_sensors = profile.distinct_sensors,
                distinct_reading_types = profile.distinct_reading_types,
                "ingestion summary (by reading_type):"
            );
            for reading in &profile.readings {
                info!(
                    "  - {}: count={}, avg={:?}, min={:?}, max={:?}, avg_batt={:?}",
                    reading.reading_type,
                    reading.record_count,
                    reading.avg_value,
                    reading.min_value,
                    reading.max_value,
                    reading.avg_battery
                );
            }
            for (column, ratio) in &profile.null_ratios {
                if *ratio > 0.0 {
                    info!(file = %basename, column = %column, ratio, "null ratio");
                }
            }
        }
        Err(err) => warn!(file = %basename, %err, "profiling failed"),
    }

    let dq_warning = content_warning(&df);
    if let Some(warning) = &dq_warning {
        warn!(file = %basename, warning = %warning, "data quality warning");
    }

    let rows = df.height() as u64;
    let processed_path = processed_output_path(&ctx.paths.processed_dir, path);
    batch::write_parquet_atomic(&mut df, &processed_path, ParquetCompression::default())?;
    info!(file = %basename, output = %processed_path.display(), rows, "processed file written");

    state.record(&basename, checksum, rows, FileStatus::Success);
    log.append(&IngestionLogEntry::new(
        basename,
        rows,
        FileStatus::Success,
        dq_warning,
        started.elapsed().as_secs_f64(),
    ))?;
    Ok(FileStatus::Success)
}

#[allow(clippy::too_many_arguments)]
fn quarantine(
    ctx: &PipelineContext,
    path: &Path,
    basename: &str,
    checksum: Option<String>,
    status: FileStatus,
    reason: String,
    state: &mut CheckpointState,
    log: &IngestionLog,
    started: Instant,
) -> Result<FileStatus> {
    fs::create_dir_all(&ctx.paths.quarantine_dir)?;
    let dest = ctx.paths.quarantine_dir.join(basename);
    move_file(path, &dest)?;
    info!(file = %basename, dest = %dest.display(), "quarantined");

    state.record(basename, checksum, 0, status);
    log.append(&IngestionLogEntry::new(
        basename,
        0,
        status,
        Some(reason),
        started.elapsed().as_secs_f64(),
    ))?;
    Ok(status)
}

/// Rename, falling back to copy + remove across filesystems. The original
/// bytes are preserved for post-mortem either way.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    fs::remove_file(from)?;
    Ok(())
}

fn processed_output_path(processed_dir: &Path, input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("input");
    processed_dir.join(format!("{stem}_processed.parquet"))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn all_null_column(df: &DataFrame) -> Option<&'static str> {
    if df.height() == 0 {
        return None;
    }
    for column in ["value", "battery_level"] {
        if let Ok(series) = df.column(column) {
            if series.null_count() == df.height() {
                return Some(column);
            }
        }
    }
    None
}

fn content_warning(df: &DataFrame) -> Option<String> {
    let mut parts = Vec::new();
    for column in ["sensor_id", "timestamp", "value"] {
        if let Ok(series) = df.column(column) {
            let nulls = series.null_count();
            if nulls > 0 {
                parts.push(format!("{column}:{nulls}"));
            }
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("missing {}", parts.join(", ")))
    }
}
