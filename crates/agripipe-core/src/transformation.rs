//! Transformation stage: clean -> calibrate -> canonicalize timestamps ->
//! derive features, per `_processed` file. A failure aborts only the file
//! it happened in.

use std::path::{Path, PathBuf};

use polars::io::parquet::write::ParquetCompression;
use tracing::{error, info};

use crate::batch;
use crate::calibration;
use crate::cleaning;
use crate::context::PipelineContext;
use crate::error::{PipelineError, Result};
use crate::features;
use crate::timestamps;

#[derive(Debug, Default, Clone, Copy)]
pub struct TransformationSummary {
    pub transformed: usize,
    pub failed: usize,
}

pub fn run(ctx: &PipelineContext) -> Result<TransformationSummary> {
    let files = processed_files(&ctx.paths.processed_dir)?;
    if files.is_empty() {
        info!("no processed files found; run ingestion first");
        return Ok(TransformationSummary::default());
    }

    let mut summary = TransformationSummary::default();
    for path in files {
        match transform_file(ctx, &path) {
            Ok(output) => {
                info!(
                    input = %path.display(),
                    output = %output.display(),
                    "transformed"
                );
                summary.transformed += 1;
            }
            Err(err) => {
                error!(input = %path.display(), %err, "transformation failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        transformed = summary.transformed,
        failed = summary.failed,
        "transformation complete"
    );
    Ok(summary)
}

/// Runs the four substeps over one file and writes the `_transformed`
/// sibling atomically.
pub fn transform_file(ctx: &PipelineContext, input: &Path) -> Result<PathBuf> {
    let df = batch::read_parquet(input)?;

    let df = cleaning::clean(&df, &ctx.config)?;
    let df = calibration::apply_calibration(&df, &ctx.config)?;
    let df = timestamps::process(&df)?;
    let mut df = features::derive_features(&df, &ctx.config)?;

    let output = transformed_output_path(&ctx.paths.transformed_dir, input)?;
    batch::write_parquet_atomic(&mut df, &output, ParquetCompression::default())?;
    Ok(output)
}

/// `_processed` inputs only; already-transformed files are never re-read.
fn processed_files(processed_dir: &Path) -> Result<Vec<PathBuf>> {
    let pattern = processed_dir.join("*_processed.parquet");
    let pattern = pattern.to_str().ok_or_else(|| {
        PipelineError::Processing(format!(
            "processed directory path is not valid UTF-8: {}",
            processed_dir.display()
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

fn transformed_output_path(transformed_dir: &Path, input: &Path) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            PipelineError::Processing(format!("input file has no UTF-8 stem: {}", input.display()))
        })?;
    let base = stem.strip_suffix("_processed").unwrap_or(stem);
    Ok(transformed_dir.join(format!("{base}_transformed.parquet")))
}
