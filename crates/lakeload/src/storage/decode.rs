//! Tabular file decoding by extension.
//!
//! The format set is a closed enum: anything outside it is rejected at the
//! boundary with a typed error, which the extract stage downgrades to a
//! logged skip.

use crate::error::{EtlError, Result};
use crate::frame::{Column, ColumnType, Frame, Value};
use bytes::Bytes;

/// Supported tabular file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
    Parquet,
    Feather,
    Excel,
}

impl FileFormat {
    /// Resolve a file extension (without the dot, any case) to a format.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "json" => Ok(FileFormat::Json),
            "parquet" => Ok(FileFormat::Parquet),
            "feather" => Ok(FileFormat::Feather),
            "xlsx" | "xls" => Ok(FileFormat::Excel),
            other => Err(EtlError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decode raw bytes into a frame.
pub fn decode(format: FileFormat, bytes: &Bytes) -> Result<Frame> {
    match format {
        FileFormat::Csv => decode_csv(bytes),
        FileFormat::Json => decode_json(bytes),
        FileFormat::Parquet => super::arrow::from_parquet_bytes(bytes.clone()),
        FileFormat::Feather => super::arrow::from_ipc_bytes(bytes),
        FileFormat::Excel => decode_excel(bytes),
    }
}

fn decode_csv(bytes: &[u8]) -> Result<Frame> {
    let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();

    let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            cells[i].push(field.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| infer_csv_column(name, raw))
        .collect();
    Frame::try_new(columns)
}

/// Infer a raw column type from string cells: all-integer wins, then
/// numeric, then boolean, otherwise text. Empty cells are null and do not
/// vote.
fn infer_csv_column(name: String, raw: Vec<String>) -> Column {
    let mut non_null = 0usize;
    let mut all_int = true;
    let mut all_float = true;
    let mut all_bool = true;

    for cell in raw.iter().filter(|c| !c.is_empty()) {
        non_null += 1;
        all_int = all_int && cell.parse::<i64>().is_ok();
        all_float = all_float && cell.parse::<f64>().is_ok();
        all_bool =
            all_bool && (cell.eq_ignore_ascii_case("true") || cell.eq_ignore_ascii_case("false"));
    }

    let ty = if non_null == 0 {
        ColumnType::Text
    } else if all_int {
        ColumnType::Int
    } else if all_float {
        ColumnType::Float
    } else if all_bool {
        ColumnType::Bool
    } else {
        ColumnType::Text
    };

    let values = raw
        .into_iter()
        .map(|cell| {
            if cell.is_empty() {
                return Value::Null;
            }
            match ty {
                ColumnType::Int => cell.parse().map(Value::Int).unwrap_or(Value::Null),
                ColumnType::Float => cell.parse().map(Value::Float).unwrap_or(Value::Null),
                ColumnType::Bool => Value::Bool(cell.eq_ignore_ascii_case("true")),
                _ => Value::Text(cell),
            }
        })
        .collect();

    Column::new(name, ty, values)
}

fn decode_excel(bytes: &[u8]) -> Result<Frame> {
    use calamine::Reader;

    let cursor = std::io::Cursor::new(bytes.to_vec());
    let mut workbook = calamine::open_workbook_auto_from_rs(cursor)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EtlError::Schema("workbook has no sheets".into()))??;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header) => header.iter().map(|c| c.to_string()).collect(),
        None => return Frame::try_new(vec![]),
    };

    let mut cells: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for row in rows {
        for (i, out) in cells.iter_mut().enumerate() {
            out.push(excel_cell_to_value(row.get(i)));
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| {
            let ty = unify_value_types(&values);
            let values = values.into_iter().map(|v| coerce_value(v, ty)).collect();
            Column::new(name, ty, values)
        })
        .collect();
    Frame::try_new(columns)
}

/// Cells are already typed in the workbook, so no string sniffing: the cell
/// type carries over directly and per-column unification resolves mixes.
fn excel_cell_to_value(cell: Option<&calamine::Data>) -> Value {
    use calamine::Data;

    match cell {
        None | Some(Data::Empty) => Value::Null,
        Some(Data::Int(i)) => Value::Int(*i),
        Some(Data::Float(f)) => Value::Float(*f),
        Some(Data::Bool(b)) => Value::Bool(*b),
        Some(Data::String(s)) => Value::Text(s.clone()),
        Some(Data::DateTime(dt)) => dt
            .as_datetime()
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        Some(other) => Value::Text(other.to_string()),
    }
}

/// Pick one column type for pre-typed cells: same-typed columns keep their
/// type, an int/float mix promotes to float, anything else (or all-null)
/// is text.
fn unify_value_types(values: &[Value]) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for value in values {
        let ty = match value {
            Value::Null => continue,
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::Bool(_) => ColumnType::Bool,
            Value::Text(_) => ColumnType::Text,
            Value::Timestamp(_) => ColumnType::Timestamp,
        };
        seen = Some(match (seen, ty) {
            (None, ty) => ty,
            (Some(prev), ty) if prev == ty => prev,
            (Some(ColumnType::Int), ColumnType::Float)
            | (Some(ColumnType::Float), ColumnType::Int) => ColumnType::Float,
            _ => return ColumnType::Text,
        });
    }
    seen.unwrap_or(ColumnType::Text)
}

fn coerce_value(value: Value, ty: ColumnType) -> Value {
    match (ty, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::Float, Value::Int(i)) => Value::Float(i as f64),
        (ColumnType::Text, Value::Int(i)) => Value::Text(i.to_string()),
        (ColumnType::Text, Value::Float(f)) => Value::Text(f.to_string()),
        (ColumnType::Text, Value::Bool(b)) => Value::Text(b.to_string()),
        (ColumnType::Text, Value::Timestamp(t)) => {
            Value::Text(t.format("%Y-%m-%d %H:%M:%S").to_string())
        }
        (_, value) => value,
    }
}

fn decode_json(bytes: &[u8]) -> Result<Frame> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> =
        match serde_json::from_slice::<serde_json::Value>(bytes)? {
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(EtlError::Schema(format!(
                        "expected a JSON array of objects, found element: {}",
                        other
                    ))),
                })
                .collect::<Result<_>>()?,
            _ => {
                return Err(EtlError::Schema(
                    "expected a JSON array of objects".into(),
                ))
            }
        };

    // Column order: first appearance across all records.
    let mut names: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !names.iter().any(|n| n == key) {
                names.push(key.clone());
            }
        }
    }

    let columns = names
        .into_iter()
        .map(|name| {
            let ty = unify_json_types(rows.iter().map(|row| row.get(&name)));
            let values = rows
                .iter()
                .map(|row| json_to_value(row.get(&name), ty))
                .collect();
            Column::new(name, ty, values)
        })
        .collect();
    Frame::try_new(columns)
}

/// Pick one column type for a set of JSON cells: a pure-integer column is
/// Int, integers mixed with floats promote to Float, pure booleans stay
/// Bool, anything else (or all-null) is Text.
fn unify_json_types<'a>(
    cells: impl Iterator<Item = Option<&'a serde_json::Value>>,
) -> ColumnType {
    let mut seen: Option<ColumnType> = None;
    for cell in cells {
        let ty = match cell {
            None | Some(serde_json::Value::Null) => continue,
            Some(serde_json::Value::Bool(_)) => ColumnType::Bool,
            Some(serde_json::Value::Number(n)) => {
                if n.as_i64().is_some() {
                    ColumnType::Int
                } else {
                    ColumnType::Float
                }
            }
            Some(_) => ColumnType::Text,
        };
        seen = Some(match (seen, ty) {
            (None, ty) => ty,
            (Some(prev), ty) if prev == ty => prev,
            (Some(ColumnType::Int), ColumnType::Float)
            | (Some(ColumnType::Float), ColumnType::Int) => ColumnType::Float,
            _ => return ColumnType::Text,
        });
    }
    seen.unwrap_or(ColumnType::Text)
}

fn json_to_value(cell: Option<&serde_json::Value>, ty: ColumnType) -> Value {
    let cell = match cell {
        None | Some(serde_json::Value::Null) => return Value::Null,
        Some(cell) => cell,
    };
    match ty {
        ColumnType::Int => cell.as_i64().map(Value::Int).unwrap_or(Value::Null),
        ColumnType::Float => cell.as_f64().map(Value::Float).unwrap_or(Value::Null),
        ColumnType::Bool => cell.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        _ => match cell {
            serde_json::Value::String(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        assert_eq!(FileFormat::from_extension("csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_extension("CSV").unwrap(), FileFormat::Csv);
        assert_eq!(
            FileFormat::from_extension("parquet").unwrap(),
            FileFormat::Parquet
        );
        assert_eq!(
            FileFormat::from_extension("xlsx").unwrap(),
            FileFormat::Excel
        );
        assert_eq!(FileFormat::from_extension("xls").unwrap(), FileFormat::Excel);
        assert!(FileFormat::from_extension("pkl").is_err());
        assert!(FileFormat::from_extension("h5").is_err());
    }

    #[test]
    fn test_csv_type_inference() {
        let bytes = Bytes::from(
            "id,score,active,label,joined\n\
             1,4.5,true,ana,2024-01-01\n\
             2,3,false,bob,2024-01-02\n\
             3,,true,,\n",
        );
        let frame = decode_csv(&bytes).unwrap();

        assert_eq!(frame.column("id").unwrap().ty, ColumnType::Int);
        assert_eq!(frame.column("score").unwrap().ty, ColumnType::Float);
        assert_eq!(frame.column("active").unwrap().ty, ColumnType::Bool);
        assert_eq!(frame.column("label").unwrap().ty, ColumnType::Text);
        // Date strings stay text at decode time; the cleaning engine owns
        // date classification.
        assert_eq!(frame.column("joined").unwrap().ty, ColumnType::Text);

        assert_eq!(frame.column("score").unwrap().values[1], Value::Float(3.0));
        assert!(frame.column("score").unwrap().values[2].is_null());
        assert!(frame.column("label").unwrap().values[2].is_null());
    }

    #[test]
    fn test_csv_all_empty_column_is_text() {
        let bytes = Bytes::from("a,b\n1,\n2,\n");
        let frame = decode_csv(&bytes).unwrap();
        let col = frame.column("b").unwrap();
        assert_eq!(col.ty, ColumnType::Text);
        assert!(col.values.iter().all(Value::is_null));
    }

    #[test]
    fn test_excel_cell_mapping() {
        use calamine::Data;

        assert!(excel_cell_to_value(None).is_null());
        assert!(excel_cell_to_value(Some(&Data::Empty)).is_null());
        assert_eq!(
            excel_cell_to_value(Some(&Data::Float(4.5))),
            Value::Float(4.5)
        );
        assert_eq!(
            excel_cell_to_value(Some(&Data::Bool(true))),
            Value::Bool(true)
        );
        assert_eq!(
            excel_cell_to_value(Some(&Data::String("ana".into()))),
            Value::Text("ana".into())
        );
    }

    #[test]
    fn test_excel_column_unification() {
        // Workbooks store most numbers as floats; an int/float mix promotes.
        let mixed_numeric = vec![Value::Int(1), Value::Float(2.5), Value::Null];
        assert_eq!(unify_value_types(&mixed_numeric), ColumnType::Float);
        assert_eq!(
            coerce_value(Value::Int(1), ColumnType::Float),
            Value::Float(1.0)
        );

        let mixed = vec![Value::Int(1), Value::Text("two".into())];
        assert_eq!(unify_value_types(&mixed), ColumnType::Text);
        assert_eq!(
            coerce_value(Value::Int(1), ColumnType::Text),
            Value::Text("1".into())
        );

        assert_eq!(unify_value_types(&[Value::Null]), ColumnType::Text);
    }

    #[test]
    fn test_excel_garbage_rejected() {
        assert!(decode_excel(b"not a workbook").is_err());
    }

    #[test]
    fn test_json_decode() {
        let bytes = br#"[
            {"id": 1, "score": 4.5, "name": "ana"},
            {"id": 2, "score": 3, "name": null, "extra": true}
        ]"#;
        let frame = decode_json(bytes).unwrap();

        assert_eq!(frame.row_count(), 2);
        assert_eq!(frame.column("id").unwrap().ty, ColumnType::Int);
        // Mixed int/float promotes to float.
        assert_eq!(frame.column("score").unwrap().ty, ColumnType::Float);
        assert_eq!(frame.column("score").unwrap().values[1], Value::Float(3.0));
        assert!(frame.column("name").unwrap().values[1].is_null());
        // Key absent from the first record is null there.
        assert!(frame.column("extra").unwrap().values[0].is_null());
        assert_eq!(frame.column("extra").unwrap().values[1], Value::Bool(true));
    }

    #[test]
    fn test_json_mixed_types_fall_back_to_text() {
        let bytes = br#"[{"v": 1}, {"v": "two"}]"#;
        let frame = decode_json(bytes).unwrap();
        let col = frame.column("v").unwrap();
        assert_eq!(col.ty, ColumnType::Text);
        assert_eq!(col.values[0], Value::Text("1".into()));
        assert_eq!(col.values[1], Value::Text("two".into()));
    }

    #[test]
    fn test_json_non_array_rejected() {
        assert!(decode_json(br#"{"id": 1}"#).is_err());
        assert!(decode_json(br#"[1, 2, 3]"#).is_err());
    }
}
