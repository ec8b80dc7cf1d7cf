//! Per-reading-type thresholds and calibration constants, loaded once per
//! run from `config/sensor_config.json` and immutable afterwards.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default)]
    pub offset: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            multiplier: default_multiplier(),
            offset: 0.0,
        }
    }
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadingTypeConfig {
    #[serde(default = "default_min")]
    pub min: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default)]
    pub calibration: Calibration,
}

fn default_min() -> f64 {
    f64::NEG_INFINITY
}

fn default_max() -> f64 {
    f64::INFINITY
}

/// Keyed lookup from `reading_type` to its thresholds. Unknown keys resolve
/// to a neutral default: an unbounded range and identity calibration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorConfig(BTreeMap<String, ReadingTypeConfig>);

impl SensorConfig {
    /// Loads the config file. A missing or unparseable file is fatal for
    /// the run.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!(
                "cannot read sensor config {}: {err}",
                path.display()
            ))
        })?;
        Self::parse(&text).map_err(|err| {
            PipelineError::Config(format!(
                "cannot parse sensor config {}: {err}",
                path.display()
            ))
        })
    }

    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn get(&self, reading_type: &str) -> Option<&ReadingTypeConfig> {
        self.0.get(reading_type)
    }

    /// `[min, max]` range for a reading type; `(-inf, +inf)` when unknown.
    pub fn limits(&self, reading_type: &str) -> (f64, f64) {
        match self.0.get(reading_type) {
            Some(entry) => (entry.min, entry.max),
            None => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    /// `(multiplier, offset)` for a reading type; identity when unknown.
    pub fn calibration(&self, reading_type: &str) -> (f64, f64) {
        match self.0.get(reading_type) {
            Some(entry) => (entry.calibration.multiplier, entry.calibration.offset),
            None => (1.0, 0.0),
        }
    }
}
