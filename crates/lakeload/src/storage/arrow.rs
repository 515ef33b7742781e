//! Frame <-> arrow conversion and parquet/IPC (de)serialization.

use crate::error::{EtlError, Result};
use crate::frame::{Column, ColumnType, Frame, Value};
use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

/// Convert a frame into a single record batch. All columns are nullable.
pub fn frame_to_batch(frame: &Frame) -> Result<RecordBatch> {
    if frame.column_count() == 0 {
        return Err(EtlError::Schema("frame has no columns".into()));
    }

    let mut fields = Vec::with_capacity(frame.column_count());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(frame.column_count());

    for col in frame.columns() {
        let (data_type, array): (DataType, ArrayRef) = match col.ty {
            ColumnType::Int => (
                DataType::Int64,
                Arc::new(Int64Array::from(
                    col.values
                        .iter()
                        .map(|v| match v {
                            Value::Int(i) => Some(*i),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Float => (
                DataType::Float64,
                Arc::new(Float64Array::from(
                    col.values
                        .iter()
                        .map(|v| match v {
                            Value::Float(f) => Some(*f),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Bool => (
                DataType::Boolean,
                Arc::new(BooleanArray::from(
                    col.values
                        .iter()
                        .map(|v| match v {
                            Value::Bool(b) => Some(*b),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Text => (
                DataType::Utf8,
                Arc::new(StringArray::from(
                    col.values
                        .iter()
                        .map(|v| match v {
                            Value::Text(s) => Some(s.as_str()),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
            ColumnType::Timestamp => (
                DataType::Timestamp(TimeUnit::Microsecond, None),
                Arc::new(TimestampMicrosecondArray::from(
                    col.values
                        .iter()
                        .map(|v| match v {
                            Value::Timestamp(t) => Some(t.and_utc().timestamp_micros()),
                            _ => None,
                        })
                        .collect::<Vec<_>>(),
                )),
            ),
        };
        fields.push(Field::new(&col.name, data_type, true));
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Serialize a frame as a snappy-compressed parquet file.
pub fn to_parquet_bytes(frame: &Frame) -> Result<Bytes> {
    let batch = frame_to_batch(frame)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(Bytes::from(buf))
}

/// Decode a parquet file into a frame.
pub fn from_parquet_bytes(bytes: Bytes) -> Result<Frame> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes)?;
    let schema = builder.schema().clone();
    let reader = builder.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    batches_to_frame(&schema, &batches)
}

/// Decode an arrow IPC (feather v2) file into a frame.
pub fn from_ipc_bytes(bytes: &[u8]) -> Result<Frame> {
    let reader = arrow::ipc::reader::FileReader::try_new(std::io::Cursor::new(bytes), None)?;
    let schema = reader.schema();
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    batches_to_frame(&schema, &batches)
}

/// Frame column type and canonical arrow type for a source arrow type.
fn canonical_type(data_type: &DataType) -> Result<(ColumnType, DataType)> {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => Ok((ColumnType::Int, DataType::Int64)),
        DataType::Float16 | DataType::Float32 | DataType::Float64 | DataType::Decimal128(_, _) => {
            Ok((ColumnType::Float, DataType::Float64))
        }
        DataType::Boolean => Ok((ColumnType::Bool, DataType::Boolean)),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View | DataType::Null => {
            Ok((ColumnType::Text, DataType::Utf8))
        }
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => Ok((
            ColumnType::Timestamp,
            DataType::Timestamp(TimeUnit::Microsecond, None),
        )),
        other => Err(EtlError::Schema(format!(
            "arrow type {} has no frame representation",
            other
        ))),
    }
}

fn batches_to_frame(schema: &Schema, batches: &[RecordBatch]) -> Result<Frame> {
    let mut columns = Vec::with_capacity(schema.fields().len());

    for (idx, field) in schema.fields().iter().enumerate() {
        let (ty, target) = canonical_type(field.data_type())?;
        let mut values = Vec::new();

        for batch in batches {
            let array = cast(batch.column(idx), &target)?;
            append_values(&array, ty, &mut values)?;
        }

        columns.push(Column::new(field.name().clone(), ty, values));
    }

    Frame::try_new(columns)
}

fn append_values(array: &ArrayRef, ty: ColumnType, out: &mut Vec<Value>) -> Result<()> {
    macro_rules! extend {
        ($array_ty:ty, $map:expr) => {{
            let array = array
                .as_any()
                .downcast_ref::<$array_ty>()
                .ok_or_else(|| EtlError::Schema("arrow cast produced unexpected array".into()))?;
            for i in 0..array.len() {
                if array.is_null(i) {
                    out.push(Value::Null);
                } else {
                    out.push($map(array.value(i)));
                }
            }
        }};
    }

    match ty {
        ColumnType::Int => extend!(Int64Array, Value::Int),
        ColumnType::Float => extend!(Float64Array, Value::Float),
        ColumnType::Bool => extend!(BooleanArray, Value::Bool),
        ColumnType::Text => extend!(StringArray, |s: &str| Value::Text(s.to_string())),
        ColumnType::Timestamp => extend!(TimestampMicrosecondArray, |micros| {
            DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .unwrap_or(Value::Null)
        }),
    }
    Ok(())
}
