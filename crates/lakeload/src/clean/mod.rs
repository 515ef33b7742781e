//! Type inference and cleaning engine.
//!
//! Per dataset: drop exact duplicate rows, reclassify text columns whose
//! values are mostly parseable dates, then fill nulls with a per-type
//! default. Date columns keep their nulls; a missing date stays missing.

use crate::error::{EtlError, Result};
use crate::frame::{Column, ColumnType, Frame, FrameSet, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::HashSet;
use tracing::debug;

/// Date-time formats attempted in strict priority order. A value is tried
/// against a later format only after failing every earlier one.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.6f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Clean every frame in the collection. Returns a new collection; the
/// input is never mutated and output frames share no storage with it.
pub fn clean(frames: &FrameSet, date_threshold: f64) -> Result<FrameSet> {
    if !(0.0..=1.0).contains(&date_threshold) {
        return Err(EtlError::Config(format!(
            "date_threshold must be within [0, 1], got {}",
            date_threshold
        )));
    }

    let mut cleaned = FrameSet::new();
    for (name, frame) in frames {
        let before = frame.row_count();
        let mut frame = dedupe(frame);

        for col in frame.columns_mut() {
            if col.ty == ColumnType::Text {
                sniff_dates(col, date_threshold);
            }
        }
        for col in frame.columns_mut() {
            fill_nulls(col);
        }

        debug!(
            "Cleaned '{}': {} rows in, {} rows out",
            name,
            before,
            frame.row_count()
        );
        cleaned.insert(name.clone(), frame);
    }
    Ok(cleaned)
}

/// Remove rows that are exact duplicates across all columns, keeping the
/// first occurrence and the relative order of the rest.
pub fn dedupe(frame: &Frame) -> Frame {
    let mut seen = HashSet::new();
    let keep: Vec<usize> = (0..frame.row_count())
        .filter(|&i| seen.insert(frame.row_key(i)))
        .collect();
    frame.select_rows(&keep)
}

/// Parse a raw string through the tiered formats. Timestamp formats take
/// priority over the bare date, which resolves to midnight.
fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Column-level date classification. If the fraction of rows that parse as
/// dates reaches the threshold (inclusive), the whole column becomes a
/// timestamp column: every value is replaced by its parse result, and
/// values no format accepts become null.
fn sniff_dates(col: &mut Column, threshold: f64) {
    let rows = col.values.len();
    if rows == 0 {
        // Ratio undefined; an empty column is never a date column.
        return;
    }

    let parsed: Vec<Option<NaiveDateTime>> = col
        .values
        .iter()
        .map(|v| match v {
            Value::Text(raw) => parse_datetime(raw),
            _ => None,
        })
        .collect();

    let hits = parsed.iter().filter(|p| p.is_some()).count();
    if (hits as f64 / rows as f64) >= threshold {
        col.ty = ColumnType::Timestamp;
        col.values = parsed
            .into_iter()
            .map(|p| p.map(Value::Timestamp).unwrap_or(Value::Null))
            .collect();
    }
}

/// Replace nulls with the per-type default. Timestamp columns are left
/// alone: null is the explicit missing-date marker.
fn fill_nulls(col: &mut Column) {
    let fill = match col.ty {
        ColumnType::Int => Value::Int(0),
        ColumnType::Float => Value::Float(0.0),
        ColumnType::Bool => Value::Bool(false),
        ColumnType::Text => Value::Text(String::new()),
        ColumnType::Timestamp => return,
    };
    for value in col.values.iter_mut() {
        if value.is_null() {
            *value = fill.clone();
        }
    }
}
