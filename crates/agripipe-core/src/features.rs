//! Derived features over the transformed batch: calendar date, per-day
//! group averages, a 7-row trailing mean, and the configured-range
//! anomaly flag.

use std::collections::{HashMap, VecDeque};

use polars::prelude::*;

use crate::batch;
use crate::config::SensorConfig;
use crate::error::Result;
use crate::timestamps;

const ROLLING_WINDOW_ROWS: usize = 7;

/// Adds `date`, `daily_avg`, `rolling_7d_avg`, and `anomalous_reading`.
///
/// The rolling mean is a trailing window of 7 rows (expanding until 7 are
/// available) per (`sensor_id`, `reading_type`), ordered by timestamp with
/// ingestion order as the tiebreaker so identical inputs always produce
/// identical output.
pub fn derive_features(df: &DataFrame, config: &SensorConfig) -> Result<DataFrame> {
    let sensor_ids = batch::string_column(df, "sensor_id")?;
    let reading_types = batch::string_column(df, "reading_type")?;
    let timestamps_raw = batch::string_column(df, "timestamp")?;
    let values = batch::float_column(df, "value")?;
    let height = df.height();

    let dates: Vec<Option<String>> = timestamps_raw
        .iter()
        .map(|ts| {
            ts.as_deref()
                .and_then(timestamps::parse_flexible)
                .map(|dt| dt.date().format("%Y-%m-%d").to_string())
        })
        .collect();

    // Daily average per (sensor_id, reading_type, date), broadcast back to
    // every row of the group. Nulls contribute nothing to the mean.
    let mut daily_sums: HashMap<(&str, &str, &str), (f64, usize)> = HashMap::new();
    for idx in 0..height {
        if let (Some(sensor), Some(rt), Some(date), Some(v)) = (
            sensor_ids[idx].as_deref(),
            reading_types[idx].as_deref(),
            dates[idx].as_deref(),
            values[idx],
        ) {
            let entry = daily_sums.entry((sensor, rt, date)).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    let mut daily_avg: Vec<Option<f64>> = vec![None; height];
    for idx in 0..height {
        if let (Some(sensor), Some(rt), Some(date)) = (
            sensor_ids[idx].as_deref(),
            reading_types[idx].as_deref(),
            dates[idx].as_deref(),
        ) {
            daily_avg[idx] = daily_sums
                .get(&(sensor, rt, date))
                .filter(|(_, count)| *count > 0)
                .map(|(sum, count)| sum / *count as f64);
        }
    }

    // Rolling mean: stable total order on (sensor, type, timestamp, row).
    let mut order: Vec<usize> = (0..height).collect();
    order.sort_by(|&a, &b| {
        (
            sensor_ids[a].as_deref(),
            reading_types[a].as_deref(),
            timestamps_raw[a].as_deref(),
            a,
        )
            .cmp(&(
                sensor_ids[b].as_deref(),
                reading_types[b].as_deref(),
                timestamps_raw[b].as_deref(),
                b,
            ))
    });

    let mut rolling: Vec<Option<f64>> = vec![None; height];
    let mut window: VecDeque<Option<f64>> = VecDeque::with_capacity(ROLLING_WINDOW_ROWS);
    let mut current_group: Option<(&str, &str)> = None;
    for &idx in &order {
        let group = match (sensor_ids[idx].as_deref(), reading_types[idx].as_deref()) {
            (Some(sensor), Some(rt)) => (sensor, rt),
            _ => continue,
        };
        if current_group != Some(group) {
            current_group = Some(group);
            window.clear();
        }
        if window.len() == ROLLING_WINDOW_ROWS {
            window.pop_front();
        }
        window.push_back(values[idx]);

        let observed: Vec<f64> = window.iter().filter_map(|v| *v).collect();
        rolling[idx] = if observed.is_empty() {
            None
        } else {
            Some(observed.iter().sum::<f64>() / observed.len() as f64)
        };
    }

    // Anomaly flag from the configured range; unknown types never flag.
    let mut anomalous = Vec::with_capacity(height);
    for idx in 0..height {
        let flagged = match (reading_types[idx].as_deref(), values[idx]) {
            (Some(rt), Some(v)) => {
                let (low, high) = config.limits(rt);
                v < low || v > high
            }
            _ => false,
        };
        anomalous.push(flagged);
    }

    let mut out = df.clone();
    out.hstack_mut(&mut [
        Series::new("date".into(), dates).into(),
        Series::new("daily_avg".into(), daily_avg).into(),
        Series::new("rolling_7d_avg".into(), rolling).into(),
        Series::new("anomalous_reading".into(), anomalous).into(),
    ])?;
    Ok(out)
}
