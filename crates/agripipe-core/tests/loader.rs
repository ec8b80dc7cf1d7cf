use std::fs::File;
use std::path::Path;

use polars::df;
use polars::prelude::*;
use tempfile::TempDir;

use agripipe_core::batch;
use agripipe_core::config::SensorConfig;
use agripipe_core::context::{DataPaths, PipelineContext};
use agripipe_core::loader;

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
    let ctx = PipelineContext::new(paths, SensorConfig::default());
    ctx.ensure_directories().unwrap();
    ctx
}

fn write_parquet(df: &mut DataFrame, path: &Path) {
    let mut file = File::create(path).unwrap();
    ParquetWriter::new(&mut file).finish(df).unwrap();
}

fn transformed_batch() -> DataFrame {
    df![
        "sensor_id" => ["s1", "s2"],
        "timestamp" => ["2025-06-05T10:00:00", "2025-06-05T11:00:00"],
        "reading_type" => ["temperature", "humidity"],
        "value" => [26.0, 98.3],
        "battery_level" => [90.0, 85.0],
        "date" => ["2025-06-05", "2025-06-05"],
    ]
    .unwrap()
}

#[test]
fn partitions_by_date_and_sensor() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    write_parquet(
        &mut transformed_batch(),
        &ctx.paths.transformed_dir.join("day_transformed.parquet"),
    );

    let summary = loader::run(&ctx).unwrap();
    assert_eq!(summary.files_loaded, 1);
    assert_eq!(summary.partitions_written, 2);

    let s1_part = ctx
        .paths
        .analytics_dir
        .join("date=2025-06-05/sensor_id=s1/part-0.parquet");
    let s2_part = ctx
        .paths
        .analytics_dir
        .join("date=2025-06-05/sensor_id=s2/part-0.parquet");
    assert!(s1_part.exists());
    assert!(s2_part.exists());

    // Partition key columns live in the directory names, not the files.
    let part = batch::read_parquet(&s1_part).unwrap();
    assert_eq!(part.height(), 1);
    let names: Vec<String> = part
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    assert!(!names.contains(&"sensor_id".to_string()));
    assert!(!names.contains(&"date".to_string()));
    assert!(names.contains(&"value".to_string()));
}

#[test]
fn reloading_appends_new_part_files_in_the_same_partition() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    write_parquet(
        &mut transformed_batch(),
        &ctx.paths.transformed_dir.join("day_transformed.parquet"),
    );

    loader::run(&ctx).unwrap();
    loader::run(&ctx).unwrap();

    let partition = ctx.paths.analytics_dir.join("date=2025-06-05/sensor_id=s1");
    assert!(partition.join("part-0.parquet").exists());
    assert!(partition.join("part-1.parquet").exists());

    // A reader over the partition sees both appends.
    let first = batch::read_parquet(&partition.join("part-0.parquet")).unwrap();
    let second = batch::read_parquet(&partition.join("part-1.parquet")).unwrap();
    assert_eq!(first.height() + second.height(), 2);
}

#[test]
fn missing_timestamp_column_loads_under_unknown_date() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());

    let mut df = df![
        "sensor_id" => ["s1"],
        "reading_type" => ["temperature"],
        "value" => [26.0],
        "battery_level" => [90.0],
    ]
    .unwrap();
    write_parquet(
        &mut df,
        &ctx.paths.transformed_dir.join("nots_transformed.parquet"),
    );

    let summary = loader::run(&ctx).unwrap();
    assert_eq!(summary.files_loaded, 1);
    assert!(ctx
        .paths
        .analytics_dir
        .join("date=unknown/sensor_id=s1/part-0.parquet")
        .exists());
}

#[test]
fn empty_transformed_directory_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let ctx = context(dir.path());
    let summary = loader::run(&ctx).unwrap();
    assert_eq!(summary.files_loaded, 0);
    assert_eq!(summary.partitions_written, 0);
}
