//! Per-reading-type affine calibration: `value <- value * multiplier + offset`.

use polars::prelude::*;
use tracing::debug;

use crate::batch;
use crate::config::SensorConfig;
use crate::error::Result;

/// Applies the configured calibration to every row. Reading types absent
/// from the config pass through unchanged (identity calibration).
pub fn apply_calibration(df: &DataFrame, config: &SensorConfig) -> Result<DataFrame> {
    let reading_types = batch::string_column(df, "reading_type")?;
    let mut values = batch::float_column(df, "value")?;

    for (idx, reading_type) in reading_types.iter().enumerate() {
        let Some(rt) = reading_type.as_deref() else {
            continue;
        };
        let (multiplier, offset) = config.calibration(rt);
        if let Some(v) = values[idx] {
            values[idx] = Some(v * multiplier + offset);
        }
    }

    for rt in distinct_types(&reading_types) {
        let (multiplier, offset) = config.calibration(&rt);
        debug!(
            reading_type = %rt,
            multiplier, offset, "applied calibration"
        );
    }

    let mut out = df.clone();
    out.with_column(Series::new("value".into(), values))?;
    Ok(out)
}

fn distinct_types(reading_types: &[Option<String>]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for rt in reading_types.iter().flatten() {
        seen.insert(rt.clone());
    }
    seen.into_iter().collect()
}
