//! Deduplication, null handling, imputation, and outlier correction over
//! an in-memory row batch.

use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use tracing::{info, warn};

use crate::batch;
use crate::config::SensorConfig;
use crate::error::Result;

const Z_SCORE_THRESHOLD: f64 = 3.0;
const MIN_GROUP_SIZE_FOR_ZSCORE: usize = 5;

/// Cleans a batch in four ordered steps: stable dedup on the reading key,
/// drop of rows with null or empty key fields, mean imputation of the
/// numeric columns, and per-reading-type outlier correction.
pub fn clean(df: &DataFrame, config: &SensorConfig) -> Result<DataFrame> {
    let sensor_ids = batch::string_column(df, "sensor_id")?;
    let timestamps = batch::string_column(df, "timestamp")?;
    let reading_types = batch::string_column(df, "reading_type")?;

    // Steps 1 and 2 share one pass: a row survives iff its key is complete
    // and unseen. First occurrence wins, preserving ingestion order.
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    let mut keep = Vec::with_capacity(df.height());
    let mut duplicates = 0usize;
    let mut null_keys = 0usize;

    for idx in 0..df.height() {
        let key = match (&sensor_ids[idx], &timestamps[idx], &reading_types[idx]) {
            (Some(sensor), Some(ts), Some(rt))
                if !sensor.is_empty() && !ts.is_empty() && !rt.is_empty() =>
            {
                (sensor.clone(), ts.clone(), rt.clone())
            }
            _ => {
                null_keys += 1;
                keep.push(false);
                continue;
            }
        };
        if seen.insert(key) {
            keep.push(true);
        } else {
            duplicates += 1;
            keep.push(false);
        }
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let mut out = df.filter(&mask)?;

    // Step 3: impute numeric nulls with the column mean over surviving
    // rows. An all-null column has no mean; its nulls are left in place.
    let mut imputed_cells = 0usize;
    let mut values = batch::float_column(&out, "value")?;
    imputed_cells += impute_with_mean(&mut values);
    let mut battery = batch::float_column(&out, "battery_level")?;
    imputed_cells += impute_with_mean(&mut battery);

    // Step 4: outlier correction per reading_type group.
    let reading_types = batch::string_column(&out, "reading_type")?;
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, reading_type) in reading_types.iter().enumerate() {
        if let Some(rt) = reading_type.as_deref() {
            groups.entry(rt).or_default().push(idx);
        }
    }

    let mut corrected = 0usize;
    let mut clipped = 0usize;
    for (reading_type, indices) in &groups {
        if indices.len() < MIN_GROUP_SIZE_FOR_ZSCORE {
            let (low, high) = config.limits(reading_type);
            for &idx in indices {
                if let Some(v) = values[idx] {
                    let bounded = v.clamp(low, high);
                    if bounded != v {
                        values[idx] = Some(bounded);
                        clipped += 1;
                    }
                }
            }
            continue;
        }

        let observed: Vec<f64> = indices.iter().filter_map(|&idx| values[idx]).collect();
        if observed.is_empty() {
            continue;
        }
        let mean = observed.iter().sum::<f64>() / observed.len() as f64;
        let variance = observed
            .iter()
            .map(|v| (v - mean).powi(2))
            .sum::<f64>()
            / observed.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            continue;
        }

        let median = median_of(&observed);
        let mut group_corrected = 0usize;
        for &idx in indices {
            if let Some(v) = values[idx] {
                if ((v - mean) / std_dev).abs() > Z_SCORE_THRESHOLD {
                    values[idx] = Some(median);
                    group_corrected += 1;
                }
            }
        }
        if group_corrected > 0 {
            info!(
                reading_type = %reading_type,
                corrected = group_corrected,
                "corrected z-score outliers with group median"
            );
            corrected += group_corrected;
        }
    }
    if clipped > 0 {
        warn!(clipped, "small-sample fallback clipped values to configured range");
    }

    out.with_column(Series::new("value".into(), values))?;
    out.with_column(Series::new("battery_level".into(), battery))?;

    info!(
        rows = out.height(),
        duplicates, null_keys, imputed_cells, corrected, clipped, "cleaning complete"
    );
    Ok(out)
}

fn impute_with_mean(values: &mut [Option<f64>]) -> usize {
    let observed: Vec<f64> = values.iter().filter_map(|v| *v).collect();
    if observed.is_empty() {
        return 0;
    }
    let mean = observed.iter().sum::<f64>() / observed.len() as f64;
    let mut filled = 0;
    for value in values.iter_mut() {
        if value.is_none() {
            *value = Some(mean);
            filled += 1;
        }
    }
    filled
}

/// Median with the usual even-count convention: the mean of the two middle
/// values.
fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
