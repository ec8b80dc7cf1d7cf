//! Process-wide paths and configuration, passed explicitly through every
//! stage instead of living in module-level globals.

use std::path::PathBuf;

use crate::config::SensorConfig;
use crate::error::Result;

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub transformed_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub analytics_dir: PathBuf,
    pub sensor_config_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub metadata_dir: PathBuf,
}

impl DataPaths {
    pub fn from_env() -> Self {
        DataPaths {
            raw_dir: env_path("RAW_DATA_PATH", "data/raw"),
            processed_dir: env_path("PROCESSED_DATA_PATH", "data/processed"),
            transformed_dir: env_path("TRANSFORMED_DATA_PATH", "data/processed"),
            quarantine_dir: env_path("QUARANTINE_DATA_PATH", "data/quarantine"),
            analytics_dir: env_path("ANALYTICS_DATA_PATH", "data/analytics"),
            sensor_config_path: env_path("SENSOR_CONFIG_PATH", "config/sensor_config.json"),
            checkpoint_path: env_path("CHECKPOINT_PATH", "state/checkpoints.json"),
            metadata_dir: PathBuf::from("metadata"),
        }
    }

    pub fn ingest_log_path(&self) -> PathBuf {
        self.metadata_dir.join("ingest_log.csv")
    }

    pub fn quality_report_path(&self) -> PathBuf {
        self.metadata_dir.join("data_quality_report.csv")
    }
}

#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub paths: DataPaths,
    pub config: SensorConfig,
}

impl PipelineContext {
    pub fn new(paths: DataPaths, config: SensorConfig) -> Self {
        PipelineContext { paths, config }
    }

    /// Resolves paths from the environment and loads the sensor config.
    pub fn from_env() -> Result<Self> {
        let paths = DataPaths::from_env();
        let config = SensorConfig::load(&paths.sensor_config_path)?;
        Ok(PipelineContext { paths, config })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.paths.raw_dir,
            &self.paths.processed_dir,
            &self.paths.transformed_dir,
            &self.paths.quarantine_dir,
            &self.paths.analytics_dir,
            &self.paths.metadata_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(parent) = self.paths.checkpoint_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }
}
