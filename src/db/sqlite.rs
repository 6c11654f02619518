//! SQLite upstream client implementation.
//!
//! Opens the database read-only. SQLite stores values by storage class, so
//! the declared column type decides whether integers are booleans and whether
//! text holds dates.

use crate::config::SourceConfig;
use crate::db::{parse_timestamp, ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{GaugeError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// SQLite database client.
#[derive(Debug)]
pub struct SqliteClient {
    pool: SqlitePool,
}

impl SqliteClient {
    /// Opens the configured database file read-only.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(config.url()?)
            .map_err(|e| GaugeError::config(format!("Invalid SQLite URL: {e}")))?
            .read_only(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| {
                GaugeError::connection(format!(
                    "Cannot open {}: {e}",
                    config.display_string()
                ))
            })?;

        debug!("Opened SQLite source {}", config.display_string());
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseClient for SqliteClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let result = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GaugeError::query(format_query_error(e)))?;

        let columns: Vec<ColumnInfo> = match result.first() {
            Some(first_row) => first_row
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            None => self.describe_columns(sql).await,
        };

        let declared: Vec<String> = columns.iter().map(|c| c.data_type.to_uppercase()).collect();
        let rows: Vec<Row> = result.iter().map(|row| convert_row(row, &declared)).collect();

        Ok(QueryResult::with_data(columns, rows))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteClient {
    async fn describe_columns(&self, sql: &str) -> Vec<ColumnInfo> {
        match (&self.pool).describe(sql).await {
            Ok(described) => described
                .columns()
                .iter()
                .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                .collect(),
            Err(e) => {
                debug!("Could not describe empty result: {e}");
                Vec::new()
            }
        }
    }
}

fn convert_row(row: &SqliteRow, declared: &[String]) -> Row {
    (0..row.columns().len())
        .map(|i| convert_value(row, i, declared.get(i).map(String::as_str).unwrap_or("")))
        .collect()
}

/// Converts one value using its storage class, refined by the declared type.
fn convert_value(row: &SqliteRow, index: usize, declared: &str) -> Value {
    let storage = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(_) => return Value::Null,
    };

    match storage.as_str() {
        "INTEGER" | "BOOLEAN" => match row.try_get::<i64, _>(index) {
            Ok(v) if is_bool_type(declared) => Value::Bool(v != 0),
            Ok(v) => Value::Int(v),
            Err(_) => Value::Null,
        },
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(Value::Float)
            .unwrap_or(Value::Null),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .map(Value::Bytes)
            .unwrap_or(Value::Null),
        _ => match row.try_get::<String, _>(index) {
            Ok(text) if is_temporal_type(declared) => parse_timestamp(&text)
                .map(Value::Timestamp)
                .unwrap_or(Value::String(text)),
            Ok(text) => Value::String(text),
            Err(_) => Value::Null,
        },
    }
}

fn is_bool_type(declared: &str) -> bool {
    matches!(declared, "BOOLEAN" | "BOOL")
}

fn is_temporal_type(declared: &str) -> bool {
    declared.contains("DATE") || declared.contains("TIME")
}

fn format_query_error(error: sqlx::Error) -> String {
    match error.as_database_error() {
        Some(db_error) => format!("ERROR: {}", db_error.message()),
        None => error.to_string(),
    }
}
