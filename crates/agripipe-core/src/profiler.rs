//! Summary statistics for a freshly-read batch. The profile is
//! logging-only: it never gates processing.

use polars::prelude::*;

use crate::error::Result;
use crate::schema::REQUIRED_COLUMNS;

#[derive(Debug, Clone)]
pub struct ReadingTypeProfile {
    pub reading_type: String,
    pub record_count: u32,
    pub avg_value: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub avg_battery: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FileProfile {
    pub readings: Vec<ReadingTypeProfile>,
    pub null_ratios: Vec<(String, f64)>,
    pub distinct_sensors: usize,
    pub distinct_reading_types: usize,
}

/// Groups the batch by `reading_type` and summarizes value and battery
/// statistics, rounded to 2 decimals, plus column null ratios and
/// distinct-key counts.
pub fn profile(df: &DataFrame) -> Result<FileProfile> {
    let summary = df
        .clone()
        .lazy()
        .group_by([col("reading_type")])
        .agg([
            len().alias("record_count"),
            col("value").cast(DataType::Float64).mean().alias("avg_value"),
            col("value").cast(DataType::Float64).min().alias("min_value"),
            col("value").cast(DataType::Float64).max().alias("max_value"),
            col("battery_level")
                .cast(DataType::Float64)
                .mean()
                .alias("avg_battery"),
        ])
        .sort(["reading_type"], SortMultipleOptions::default())
        .collect()?;

    let reading_type = summary.column("reading_type")?.str()?;
    let record_count_col = summary.column("record_count")?.cast(&DataType::UInt32)?;
    let record_count = record_count_col.u32()?;
    let avg_value = summary.column("avg_value")?.f64()?;
    let min_value = summary.column("min_value")?.f64()?;
    let max_value = summary.column("max_value")?.f64()?;
    let avg_battery = summary.column("avg_battery")?.f64()?;

    let mut readings = Vec::with_capacity(summary.height());
    for idx in 0..summary.height() {
        readings.push(ReadingTypeProfile {
            reading_type: reading_type.get(idx).unwrap_or("null").to_string(),
            record_count: record_count.get(idx).unwrap_or(0),
            avg_value: avg_value.get(idx).map(round2),
            min_value: min_value.get(idx).map(round2),
            max_value: max_value.get(idx).map(round2),
            avg_battery: avg_battery.get(idx).map(round2),
        });
    }

    let height = df.height().max(1);
    let mut null_ratios = Vec::new();
    for column in REQUIRED_COLUMNS {
        if let Ok(series) = df.column(column) {
            null_ratios.push((
                column.to_string(),
                round2(series.null_count() as f64 / height as f64),
            ));
        }
    }

    Ok(FileProfile {
        readings,
        null_ratios,
        distinct_sensors: df.column("sensor_id")?.n_unique()?,
        distinct_reading_types: df.column("reading_type")?.n_unique()?,
    })
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}
