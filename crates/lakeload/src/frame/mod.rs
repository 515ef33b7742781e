//! In-memory tabular data model threaded through the pipeline stages.

use crate::error::{EtlError, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Check whether the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Logical column type.
///
/// `Int`/`Float` are the numeric types, `Timestamp` is the date type and
/// `Text` is the generic fallback; `Bool` only arises from decoders whose
/// source format carries native booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Text,
    Timestamp,
}

/// A named column: a type plus one value per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            ty,
            values,
        }
    }
}

/// An ordered set of equal-length named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    columns: Vec<Column>,
}

impl Frame {
    /// Build a frame, validating that column names are unique and all
    /// columns have the same length.
    pub fn try_new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.values.len();
            for col in &columns {
                if col.values.len() != rows {
                    return Err(EtlError::Schema(format!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.values.len(),
                        rows
                    )));
                }
            }
        }
        for (i, col) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(EtlError::Schema(format!(
                    "duplicate column name '{}'",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Column names in declared order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Hashable identity of one row across all columns, used for exact
    /// duplicate detection. Floats hash by bit pattern.
    pub fn row_key(&self, row: usize) -> RowKey {
        RowKey(
            self.columns
                .iter()
                .map(|c| match &c.values[row] {
                    Value::Null => CellKey::Null,
                    Value::Int(v) => CellKey::Int(*v),
                    Value::Float(v) => CellKey::Bits(v.to_bits()),
                    Value::Bool(v) => CellKey::Bool(*v),
                    Value::Text(v) => CellKey::Text(v.clone()),
                    Value::Timestamp(v) => CellKey::Ts(v.and_utc().timestamp_micros()),
                })
                .collect(),
        )
    }

    /// Copy of this frame keeping only the given row indices, in order.
    pub fn select_rows(&self, keep: &[usize]) -> Frame {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                ty: c.ty,
                values: keep.iter().map(|&i| c.values[i].clone()).collect(),
            })
            .collect();
        Frame { columns }
    }
}

/// Exact row identity for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey(Vec<CellKey>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CellKey {
    Null,
    Int(i64),
    Bits(u64),
    Bool(bool),
    Text(String),
    Ts(i64),
}

/// Dataset collection: dataset name (source file stem) to frame.
pub type FrameSet = BTreeMap<String, Frame>;
