//! Persistent per-file processing state. The checkpoint is a single JSON
//! document written atomically via temp-file + rename.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Success,
    Quarantined,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileCheckpoint {
    pub checksum: Option<String>,
    pub rows: u64,
    pub status: FileStatus,
    pub processed_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    #[serde(default)]
    pub processed_files: BTreeMap<String, FileCheckpoint>,
}

impl CheckpointState {
    /// Only files that reached `success` are skipped on re-runs; a failed
    /// file restored to the raw directory is picked up again.
    pub fn is_ingested(&self, basename: &str) -> bool {
        self.processed_files
            .get(basename)
            .is_some_and(|record| record.status == FileStatus::Success)
    }

    pub fn record(
        &mut self,
        basename: &str,
        checksum: Option<String>,
        rows: u64,
        status: FileStatus,
    ) {
        self.processed_files.insert(
            basename.to_string(),
            FileCheckpoint {
                checksum,
                rows,
                status,
                processed_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            },
        );
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty state; an unparseable one is treated the
    /// same after a warning, so a corrupt checkpoint never wedges a run.
    pub fn load(&self) -> CheckpointState {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(_) => return CheckpointState::default(),
        };
        match serde_json::from_str(&text) {
            Ok(state) => state,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    %err,
                    "checkpoint file is unparseable, starting from empty state"
                );
                CheckpointState::default()
            }
        }
    }

    pub fn save(&self, state: &CheckpointState) -> Result<()> {
        let parent = self.path.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            fs::create_dir_all(parent)?;
        }

        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                PipelineError::Processing(format!(
                    "invalid checkpoint path: {}",
                    self.path.display()
                ))
            })?;
        let tmp_path = match parent {
            Some(parent) => parent.join(format!("{file_name}.tmp")),
            None => PathBuf::from(format!("{file_name}.tmp")),
        };

        let payload = serde_json::to_vec_pretty(state)?;
        let mut file = File::create(&tmp_path)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
