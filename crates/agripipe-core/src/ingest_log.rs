//! Append-only CSV log of ingestion attempts, one row per attempted file,
//! fsynced per record.

use std::fs::OpenOptions;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use crate::checkpoint::FileStatus;
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct IngestionLogEntry {
    pub filename: String,
    pub rows: u64,
    pub status: FileStatus,
    pub error: Option<String>,
    pub duration_sec: f64,
    pub timestamp: String,
}

impl IngestionLogEntry {
    pub fn new(
        filename: impl Into<String>,
        rows: u64,
        status: FileStatus,
        error: Option<String>,
        duration_sec: f64,
    ) -> Self {
        IngestionLogEntry {
            filename: filename.into(),
            rows,
            status,
            error,
            duration_sec,
            timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionLog {
    path: PathBuf,
}

impl IngestionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IngestionLog { path: path.into() }
    }

    pub fn append(&self, entry: &IngestionLogEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let write_header = !self.path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(entry)?;
        writer.flush()?;

        let file = writer.into_inner().map_err(|err| {
            PipelineError::Processing(format!("failed to flush ingest log: {err}"))
        })?;
        file.sync_all()?;
        Ok(())
    }
}
