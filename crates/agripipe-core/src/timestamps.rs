//! Timestamp canonicalization. Accepts ISO-8601 plus the alternate
//! formats seen in field data, normalizes to `YYYY-MM-DDTHH:MM:SS` UTC,
//! and derives the +05:30 local-time column.

use chrono::{DateTime, Duration, NaiveDateTime};
use polars::prelude::*;
use tracing::warn;

use crate::batch;
use crate::error::Result;

pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const NAIVE_FORMATS: [&str; 5] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %I:%M %p",
];

/// Permissive parse of a single raw timestamp. Inputs carrying an offset
/// are converted to UTC; naive inputs are treated as already UTC.
pub fn parse_flexible(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    None
}

/// Canonicalizes `timestamp`, drops rows that cannot be parsed, and adds
/// `timestamp_ist` shifted by +5h30m in the same format.
pub fn process(df: &DataFrame) -> Result<DataFrame> {
    let raw = batch::string_column(df, "timestamp")?;

    let mut keep = Vec::with_capacity(raw.len());
    let mut parsed = Vec::with_capacity(raw.len());
    for value in &raw {
        match value.as_deref().and_then(parse_flexible) {
            Some(dt) => {
                keep.push(true);
                parsed.push(dt);
            }
            None => keep.push(false),
        }
    }

    let dropped = raw.len() - parsed.len();
    if dropped > 0 {
        warn!(dropped, "dropping rows with unparseable timestamps");
    }

    let mask = BooleanChunked::from_slice("keep".into(), &keep);
    let mut out = df.filter(&mask)?;

    let ist_offset = Duration::hours(5) + Duration::minutes(30);
    let canonical: Vec<String> = parsed
        .iter()
        .map(|dt| dt.format(CANONICAL_FORMAT).to_string())
        .collect();
    let ist: Vec<String> = parsed
        .iter()
        .map(|dt| (*dt + ist_offset).format(CANONICAL_FORMAT).to_string())
        .collect();

    out.with_column(Series::new("timestamp".into(), canonical))?;
    out.with_column(Series::new("timestamp_ist".into(), ist))?;
    Ok(out)
}
