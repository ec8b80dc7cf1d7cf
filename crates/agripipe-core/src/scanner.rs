//! Discovery of raw input files that have not yet reached a successful
//! ingestion outcome.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::checkpoint::CheckpointState;
use crate::error::{PipelineError, Result};

/// Lists raw parquet files whose basenames are not checkpointed as
/// `success`, sorted lexicographically. A missing raw directory yields an
/// empty result.
pub fn list_new_files(raw_dir: &Path, state: &CheckpointState) -> Result<Vec<PathBuf>> {
    let pattern = raw_dir.join("*.parquet");
    let pattern = pattern.to_str().ok_or_else(|| {
        PipelineError::Processing(format!(
            "raw directory path is not valid UTF-8: {}",
            raw_dir.display()
        ))
    })?;

    let mut files = Vec::new();
    for entry in glob::glob(pattern)
        .map_err(|err| PipelineError::Processing(format!("invalid raw file pattern: {err}")))?
    {
        let path = match entry {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "could not read path while scanning raw directory");
                continue;
            }
        };
        if !path.is_file() {
            continue;
        }
        let Some(basename) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if !state.is_ingested(basename) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}
