use polars::df;
use polars::prelude::*;

use agripipe_core::config::SensorConfig;
use agripipe_core::features::derive_features;

fn config() -> SensorConfig {
    SensorConfig::parse(r#"{"temperature": {"min": 0, "max": 50}}"#).unwrap()
}

#[test]
fn daily_avg_is_broadcast_over_the_day_group() -> PolarsResult<()> {
    let df = df![
        "sensor_id" => ["s1", "s1", "s1", "s2"],
        "reading_type" => ["temperature"; 4],
        "timestamp" => [
            "2025-06-05T10:00:00",
            "2025-06-05T14:00:00",
            "2025-06-06T10:00:00",
            "2025-06-05T10:00:00",
        ],
        "value" => [10.0, 20.0, 40.0, 7.0],
    ]?;

    let out = derive_features(&df, &config()).unwrap();

    let dates = out.column("date")?.str()?;
    assert_eq!(dates.get(0), Some("2025-06-05"));
    assert_eq!(dates.get(2), Some("2025-06-06"));

    let daily = out.column("daily_avg")?.f64()?;
    // Rows 0 and 1 share (s1, temperature, 2025-06-05).
    assert_eq!(daily.get(0), Some(15.0));
    assert_eq!(daily.get(1), Some(15.0));
    assert_eq!(daily.get(2), Some(40.0));
    assert_eq!(daily.get(3), Some(7.0));
    Ok(())
}

#[test]
fn rolling_mean_uses_a_trailing_window_of_seven_rows() -> PolarsResult<()> {
    let timestamps: Vec<String> = (0..9)
        .map(|i| format!("2025-06-05T{:02}:00:00", i))
        .collect();
    let values: Vec<f64> = (1..=9).map(|v| v as f64).collect();

    let df = DataFrame::new(vec![
        Series::new("sensor_id".into(), vec!["s1"; 9]).into(),
        Series::new("reading_type".into(), vec!["temperature"; 9]).into(),
        Series::new("timestamp".into(), timestamps).into(),
        Series::new("value".into(), values).into(),
    ])?;

    let out = derive_features(&df, &config()).unwrap();
    let rolling = out.column("rolling_7d_avg")?.f64()?;

    // Expanding until seven rows are available...
    assert_eq!(rolling.get(0), Some(1.0));
    assert_eq!(rolling.get(1), Some(1.5));
    assert_eq!(rolling.get(6), Some(4.0));
    // ...then trailing over exactly the last seven.
    assert_eq!(rolling.get(7), Some(5.0));
    assert_eq!(rolling.get(8), Some(6.0));
    Ok(())
}

#[test]
fn rolling_window_resets_between_groups() -> PolarsResult<()> {
    let df = df![
        "sensor_id" => ["s1", "s1", "s2"],
        "reading_type" => ["temperature"; 3],
        "timestamp" => [
            "2025-06-05T10:00:00",
            "2025-06-05T11:00:00",
            "2025-06-05T10:00:00",
        ],
        "value" => [10.0, 20.0, 100.0],
    ]?;

    let out = derive_features(&df, &config()).unwrap();
    let rolling = out.column("rolling_7d_avg")?.f64()?;
    assert_eq!(rolling.get(1), Some(15.0));
    // s2 starts its own window.
    assert_eq!(rolling.get(2), Some(100.0));
    Ok(())
}

#[test]
fn anomaly_flag_follows_configured_range() -> PolarsResult<()> {
    let df = df![
        "sensor_id" => ["s1", "s1", "s1"],
        "reading_type" => ["temperature", "temperature", "wind_speed"],
        "timestamp" => [
            "2025-06-05T10:00:00",
            "2025-06-05T11:00:00",
            "2025-06-05T12:00:00",
        ],
        "value" => [25.0, 75.0, 99999.0],
    ]?;

    let out = derive_features(&df, &config()).unwrap();
    let anomalous = out.column("anomalous_reading")?.bool()?;
    assert_eq!(anomalous.get(0), Some(false));
    assert_eq!(anomalous.get(1), Some(true));
    // Unknown reading types are never flagged.
    assert_eq!(anomalous.get(2), Some(false));
    Ok(())
}

#[test]
fn output_is_deterministic_for_identical_input() -> PolarsResult<()> {
    // Two rows with identical (sensor, type, timestamp) tie-break on
    // ingestion order, so repeated runs agree.
    let df = df![
        "sensor_id" => ["s1", "s1"],
        "reading_type" => ["temperature"; 2],
        "timestamp" => ["2025-06-05T10:00:00", "2025-06-05T10:00:00"],
        "value" => [10.0, 30.0],
    ]?;

    let first = derive_features(&df, &config()).unwrap();
    let second = derive_features(&df, &config()).unwrap();
    assert!(first.equals_missing(&second));

    let rolling = first.column("rolling_7d_avg")?.f64()?;
    assert_eq!(rolling.get(0), Some(10.0));
    assert_eq!(rolling.get(1), Some(20.0));
    Ok(())
}
