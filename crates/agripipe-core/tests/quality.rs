use std::fs::{self, File};
use std::path::Path;

use polars::df;
use polars::prelude::*;
use tempfile::TempDir;

use agripipe_core::config::SensorConfig;
use agripipe_core::context::{DataPaths, PipelineContext};
use agripipe_core::quality::{self, validate_file};

fn config() -> SensorConfig {
    SensorConfig::parse(
        r#"{"temperature": {"min": 0, "max": 50}, "humidity": {"min": 0, "max": 100}}"#,
    )
    .unwrap()
}

fn context(root: &Path) -> PipelineContext {
    let paths = DataPaths {
        raw_dir: root.join("raw"),
        processed_dir: root.join("processed"),
        transformed_dir: root.join("processed"),
        quarantine_dir: root.join("quarantine"),
        analytics_dir: root.join("analytics"),
        sensor_config_path: root.join("sensor_config.json"),
        checkpoint_path: root.join("state/checkpoints.json"),
        metadata_dir: root.join("metadata"),
    };
    let ctx = PipelineContext::new(paths, config());
    ctx.ensure_directories().unwrap();
    ctx
}

fn write_parquet(df: &mut DataFrame, path: &Path) {
    let mut file = File::create(path).unwrap();
    ParquetWriter::new(&mut file).finish(df).unwrap();
}

#[test]
fn detects_hourly_coverage_gaps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gaps_transformed.parquet");

    // s1 reports at 10:00, 11:00, and 13:00 - the 12:00 bucket is missing.
    let mut df = df![
        "sensor_id" => ["s1", "s1", "s1"],
        "timestamp" => [
            "2025-06-05T10:00:00",
            "2025-06-05T11:00:00",
            "2025-06-05T13:00:00",
        ],
        "reading_type" => ["temperature"; 3],
        "value" => [20.0, 21.0, 22.0],
        "battery_level" => [90.0; 3],
    ]
    .unwrap();
    write_parquet(&mut df, &path);

    let report = validate_file(&path, &config()).unwrap();
    assert_eq!(report.total_records, 3);
    assert_eq!(report.sensors_with_gaps, 1);
    assert_eq!(report.total_missing_hours, 1);
    assert_eq!(report.invalid_timestamp, 0);
}

#[test]
fn computes_outlier_and_missing_percentages_per_type() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pct_transformed.parquet");

    let mut df = DataFrame::new(vec![
        Series::new("sensor_id".into(), vec!["s1"; 4]).into(),
        Series::new(
            "timestamp".into(),
            vec![
                "2025-06-05T10:00:00",
                "2025-06-05T11:00:00",
                "2025-06-05T12:00:00",
                "2025-06-05T13:00:00",
            ],
        )
        .into(),
        Series::new(
            "reading_type".into(),
            vec!["temperature", "temperature", "humidity", "humidity"],
        )
        .into(),
        Series::new(
            "value".into(),
            vec![Some(25.0), Some(75.0), Some(50.0), None],
        )
        .into(),
        Series::new("battery_level".into(), vec![90.0; 4]).into(),
    ])
    .unwrap();
    write_parquet(&mut df, &path);

    let report = validate_file(&path, &config()).unwrap();

    let outliers: serde_json::Value = serde_json::from_str(&report.outlier_pct).unwrap();
    assert_eq!(outliers["temperature"], 50.0);
    assert_eq!(outliers["humidity"], 0.0);

    let missing: serde_json::Value = serde_json::from_str(&report.missing_pct).unwrap();
    assert_eq!(missing["temperature"], 0.0);
    assert_eq!(missing["humidity"], 50.0);
}

#[test]
fn counts_unparseable_timestamps() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ts_transformed.parquet");

    let mut df = df![
        "sensor_id" => ["s1", "s1"],
        "timestamp" => ["2025-06-05T10:00:00", "garbage"],
        "reading_type" => ["temperature"; 2],
        "value" => [20.0, 21.0],
        "battery_level" => [90.0; 2],
    ]
    .unwrap();
    write_parquet(&mut df, &path);

    let report = validate_file(&path, &config()).unwrap();
    assert_eq!(report.invalid_timestamp, 1);
    // The bad row is excluded from the coverage computation.
    assert_eq!(report.sensors_with_gaps, 0);
}

#[test]
fn unknown_reading_type_is_counted_but_never_out_of_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unknown_transformed.parquet");

    let mut df = df![
        "sensor_id" => ["s1"],
        "timestamp" => ["2025-06-05T10:00:00"],
        "reading_type" => ["wind_speed"],
        "value" => [99999.0],
        "battery_level" => [90.0],
    ]
    .unwrap();
    write_parquet(&mut df, &path);

    let report = validate_file(&path, &config()).unwrap();
    let outliers: serde_json::Value = serde_json::from_str(&report.outlier_pct).unwrap();
    assert_eq!(outliers["wind_speed"], 0.0);
}

#[test]
fn writes_one_report_row_per_file_with_stable_columns() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());

    let mut good = df![
        "sensor_id" => ["s1"],
        "timestamp" => ["2025-06-05T10:00:00"],
        "reading_type" => ["temperature"],
        "value" => [20.0],
        "battery_level" => [90.0],
    ]
    .unwrap();
    write_parquet(
        &mut good,
        &ctx.paths.transformed_dir.join("good_transformed.parquet"),
    );
    // A file the validator cannot read yields a sentinel row, not a halt.
    fs::write(
        ctx.paths.transformed_dir.join("broken_transformed.parquet"),
        b"not parquet",
    )
    .unwrap();

    let reports = quality::run(&ctx).unwrap();
    assert_eq!(reports.len(), 2);

    let text = fs::read_to_string(ctx.paths.quality_report_path()).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "file_name,total_records,invalid_value_type,invalid_timestamp,\
         outlier_%,missing_%,sensors_with_gaps,total_missing_hours"
    );
    let broken_row = lines.next().unwrap();
    assert!(broken_row.starts_with("broken_transformed.parquet,-1,-1,-1"));
    let good_row = lines.next().unwrap();
    assert!(good_row.starts_with("good_transformed.parquet,1,0,0"));
}
