//! Conversion between [`QueryResult`] and Parquet files.
//!
//! Each column is stored with the Arrow type matching its value kind. The
//! source's type name is kept in field metadata so a reload reports the same
//! column types the upstream client did. Columns holding more than one kind
//! of value store every cell as tagged JSON so each value reloads unchanged.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float64Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, SchemaRef, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use chrono::DateTime;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::db::{ColumnInfo, QueryResult, Row, Value, ValueKind};
use crate::error::{GaugeError, Result};

/// Field metadata key holding the source type name.
pub const SOURCE_TYPE_KEY: &str = "gauge.data_type";

/// Field metadata key set on columns stored as tagged JSON cells.
pub const MIXED_KEY: &str = "gauge.mixed";

/// Writes `data` to `path` through a temporary sibling, then renames it into
/// place. Readers never observe a partial file.
pub async fn write_dataset(path: &Path, data: &QueryResult) -> Result<u64> {
    let batch = to_record_batch(data)?;
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || write_batch(&path, &batch))
        .await
        .map_err(|e| GaugeError::cache_write(format!("Parquet write task failed: {e}")))?
}

/// Reads a file written by [`write_dataset`].
pub async fn read_dataset(path: &Path) -> Result<QueryResult> {
    let path = path.to_path_buf();

    tokio::task::spawn_blocking(move || read_file(&path))
        .await
        .map_err(|e| GaugeError::persistence(format!("Parquet read task failed: {e}")))?
}

fn temp_path(path: &Path) -> PathBuf {
    path.with_extension("parquet.tmp")
}

fn write_batch(path: &Path, batch: &RecordBatch) -> Result<u64> {
    let tmp_path = temp_path(path);
    let write_error =
        |e: &dyn std::fmt::Display| GaugeError::cache_write(format!("{}: {e}", tmp_path.display()));

    let file = File::create(&tmp_path).map_err(|e| write_error(&e))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer =
        ArrowWriter::try_new(file, batch.schema(), Some(props)).map_err(|e| write_error(&e))?;
    writer.write(batch).map_err(|e| write_error(&e))?;
    writer.close().map_err(|e| write_error(&e))?;

    let size = std::fs::metadata(&tmp_path)
        .map_err(|e| write_error(&e))?
        .len();

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(GaugeError::cache_write(format!(
            "Failed to move {} into place: {e}",
            path.display()
        )));
    }

    Ok(size)
}

fn read_file(path: &Path) -> Result<QueryResult> {
    let read_error =
        |e: &dyn std::fmt::Display| GaugeError::persistence(format!("{}: {e}", path.display()));

    let file = File::open(path).map_err(|e| read_error(&e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| read_error(&e))?;
    let schema = builder.schema().clone();
    let reader = builder.build().map_err(|e| read_error(&e))?;

    let columns = columns_from_schema(&schema);
    let mut rows: Vec<Row> = Vec::new();
    for batch in reader {
        let batch = batch.map_err(|e| read_error(&e))?;
        let mut batch_rows: Vec<Row> = vec![Vec::with_capacity(columns.len()); batch.num_rows()];
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let values = if field.metadata().contains_key(MIXED_KEY) {
                mixed_values(array)?
            } else {
                array_values(array)?
            };
            for (row, value) in batch_rows.iter_mut().zip(values) {
                row.push(value);
            }
        }
        rows.extend(batch_rows);
    }

    Ok(QueryResult::with_data(columns, rows))
}

/// Builds a single record batch holding every row of `data`.
pub fn to_record_batch(data: &QueryResult) -> Result<RecordBatch> {
    let mut fields = Vec::with_capacity(data.columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(data.columns.len());

    for (index, column) in data.columns.iter().enumerate() {
        let mut metadata =
            HashMap::from([(SOURCE_TYPE_KEY.to_string(), column.data_type.clone())]);
        let array = if has_mixed_kinds(data, index) {
            metadata.insert(MIXED_KEY.to_string(), "true".to_string());
            mixed_array(data, index)?
        } else {
            column_array(data, index)
        };
        fields.push(
            Field::new(&column.name, array.data_type().clone(), true).with_metadata(metadata),
        );
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let options = RecordBatchOptions::new().with_row_count(Some(data.rows.len()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .map_err(|e| GaugeError::cache_write(format!("Cannot build record batch: {e}")))
}

/// True when the column's non-null values are not all of one kind.
fn has_mixed_kinds(data: &QueryResult, index: usize) -> bool {
    let mut kinds = data.column_values(index).filter_map(Value::kind);
    match kinds.next() {
        Some(first) => kinds.any(|kind| kind != first),
        None => false,
    }
}

fn mixed_array(data: &QueryResult, index: usize) -> Result<ArrayRef> {
    let cells = data
        .column_values(index)
        .map(|value| match value {
            Value::Null => Ok(None),
            other => serde_json::to_string(other).map(Some),
        })
        .collect::<std::result::Result<Vec<Option<String>>, _>>()
        .map_err(|e| GaugeError::cache_write(format!("Cannot encode mixed column: {e}")))?;
    Ok(Arc::new(StringArray::from(cells)))
}

fn mixed_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let typed = array.as_string_opt::<i32>().ok_or_else(|| {
        GaugeError::persistence(format!(
            "Mixed column stored as {} instead of text",
            array.data_type()
        ))
    })?;

    (0..typed.len())
        .map(|i| {
            if typed.is_null(i) {
                return Ok(Value::Null);
            }
            serde_json::from_str(typed.value(i)).map_err(|e| {
                GaugeError::persistence(format!("Cannot decode mixed cell {i}: {e}"))
            })
        })
        .collect()
}

fn column_array(data: &QueryResult, index: usize) -> ArrayRef {
    let values = || data.column_values(index);

    match data.column_kind(index) {
        Some(ValueKind::Bool) => Arc::new(
            values()
                .map(|v| match v {
                    Value::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        Some(ValueKind::Int) => Arc::new(
            values()
                .map(|v| match v {
                    Value::Int(i) => Some(*i),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        Some(ValueKind::Float) => Arc::new(
            values()
                .map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        Some(ValueKind::Bytes) => Arc::new(BinaryArray::from_iter(values().map(|v| match v {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }))),
        Some(ValueKind::Timestamp) => Arc::new(
            values()
                .map(|v| match v {
                    Value::Timestamp(ts) => Some(ts.and_utc().timestamp_micros()),
                    _ => None,
                })
                .collect::<TimestampMicrosecondArray>(),
        ),
        // Text and all-null columns are stored as strings.
        Some(ValueKind::Text) | None => Arc::new(StringArray::from_iter(values().map(|v| {
            match v {
                Value::String(s) => Some(s.clone()),
                _ => None,
            }
        }))),
    }
}

fn columns_from_schema(schema: &SchemaRef) -> Vec<ColumnInfo> {
    schema
        .fields()
        .iter()
        .map(|field| {
            let data_type = field
                .metadata()
                .get(SOURCE_TYPE_KEY)
                .cloned()
                .unwrap_or_else(|| field.data_type().to_string());
            ColumnInfo::new(field.name(), data_type)
        })
        .collect()
}

fn array_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let len = array.len();
    let collect = |get: &dyn Fn(usize) -> Value| -> Vec<Value> {
        (0..len)
            .map(|i| if array.is_null(i) { Value::Null } else { get(i) })
            .collect()
    };

    let values = match array.data_type() {
        DataType::Null => vec![Value::Null; len],
        DataType::Boolean => {
            let typed = array.as_boolean();
            collect(&|i| Value::Bool(typed.value(i)))
        }
        DataType::Int64 => {
            let typed = array.as_primitive::<Int64Type>();
            collect(&|i| Value::Int(typed.value(i)))
        }
        DataType::Float64 => {
            let typed = array.as_primitive::<Float64Type>();
            collect(&|i| Value::Float(typed.value(i)))
        }
        DataType::Utf8 => {
            let typed = array.as_string::<i32>();
            collect(&|i| Value::String(typed.value(i).to_string()))
        }
        DataType::Binary => {
            let typed = array.as_binary::<i32>();
            collect(&|i| Value::Bytes(typed.value(i).to_vec()))
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let typed = array.as_primitive::<TimestampMicrosecondType>();
            collect(&|i| {
                DateTime::from_timestamp_micros(typed.value(i))
                    .map(|dt| Value::Timestamp(dt.naive_utc()))
                    .unwrap_or(Value::Null)
            })
        }
        other => {
            return Err(GaugeError::persistence(format!(
                "Unsupported column type in cached dataset: {other}"
            )))
        }
    };

    Ok(values)
}
