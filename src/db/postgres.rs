//! PostgreSQL upstream client implementation.
//!
//! Values are decoded by Postgres type name. NUMERIC goes through
//! `rust_decimal` to `f64`, TIMESTAMPTZ is normalized to UTC, and UUID, JSON,
//! and TIME values are kept as text. Values of a type that cannot be decoded
//! are read as NULL and reported once per column.

use crate::config::SourceConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{GaugeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::{JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, TypeInfo};
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL database client.
#[derive(Debug)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connects with exponential backoff on transient failures.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let conn_str = config.url()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(10))
                .connect(conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        Err(match last_error {
            Some(e) => map_connection_error(e, config),
            None => GaugeError::connection("No connection attempt was made"),
        })
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
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

        let rows = convert_rows(&result, &columns);
        Ok(QueryResult::with_data(columns, rows))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

impl PostgresClient {
    /// Column metadata for a statement that returned no rows.
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

/// Converts every row, reporting columns whose values could not be decoded.
fn convert_rows(rows: &[PgRow], columns: &[ColumnInfo]) -> Vec<Row> {
    let decoders: Vec<Decoder> = columns
        .iter()
        .map(|c| Decoder::for_type(&c.data_type))
        .collect();
    let mut undecoded = vec![0usize; columns.len()];
    let mut converted = Vec::with_capacity(rows.len());

    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for (index, decoder) in decoders.iter().enumerate() {
            match decoder.read(row, index) {
                Ok(value) => values.push(value),
                Err(_) => {
                    undecoded[index] += 1;
                    values.push(Value::Null);
                }
            }
        }
        converted.push(values);
    }

    for (column, count) in columns.iter().zip(undecoded).filter(|(_, n)| *n > 0) {
        warn!(
            "Column '{}' has type {} that could not be decoded; {} value(s) read as NULL",
            column.name, column.data_type, count
        );
    }
    converted
}

/// How a Postgres column is read, chosen from its type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decoder {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Uuid,
    Json,
    Bytes,
    Text,
}

impl Decoder {
    fn for_type(type_name: &str) -> Self {
        match type_name.to_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Self::Bool,
            "INT2" | "SMALLINT" => Self::Int2,
            "INT4" | "INT" | "INTEGER" => Self::Int4,
            "INT8" | "BIGINT" => Self::Int8,
            "FLOAT4" | "REAL" => Self::Float4,
            "FLOAT8" | "DOUBLE PRECISION" => Self::Float8,
            "NUMERIC" | "DECIMAL" => Self::Numeric,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "UUID" => Self::Uuid,
            "JSON" | "JSONB" => Self::Json,
            "BYTEA" => Self::Bytes,
            _ => Self::Text,
        }
    }

    /// Reads column `index`. NULL is `Ok(Value::Null)`; a type the decoder
    /// cannot read is an error.
    fn read(self, row: &PgRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
        let value = match self {
            Self::Bool => decode::<bool>(row, index)?.map(Value::Bool),
            Self::Int2 => decode::<i16>(row, index)?.map(|v| Value::Int(v.into())),
            Self::Int4 => decode::<i32>(row, index)?.map(|v| Value::Int(v.into())),
            Self::Int8 => decode::<i64>(row, index)?.map(Value::Int),
            Self::Float4 => decode::<f32>(row, index)?.map(|v| Value::Float(v.into())),
            Self::Float8 => decode::<f64>(row, index)?.map(Value::Float),
            Self::Numeric => decode::<Decimal>(row, index)?
                .map(|d| d.to_f64().map(Value::Float).unwrap_or(Value::Null)),
            Self::Timestamp => decode::<NaiveDateTime>(row, index)?.map(Value::Timestamp),
            Self::TimestampTz => {
                decode::<DateTime<Utc>>(row, index)?.map(|ts| Value::Timestamp(ts.naive_utc()))
            }
            Self::Date => decode::<NaiveDate>(row, index)?
                .map(|d| d.and_hms_opt(0, 0, 0).map(Value::Timestamp).unwrap_or(Value::Null)),
            Self::Time => decode::<NaiveTime>(row, index)?.map(|t| Value::String(t.to_string())),
            Self::Uuid => decode::<Uuid>(row, index)?.map(|u| Value::String(u.to_string())),
            Self::Json => decode::<JsonValue>(row, index)?.map(|j| Value::String(j.to_string())),
            Self::Bytes => decode::<Vec<u8>>(row, index)?.map(Value::Bytes),
            Self::Text => decode::<String>(row, index)?.map(Value::String),
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

/// Reads column `index` as `T`, with NULL as `None`.
fn decode<'r, T>(row: &'r PgRow, index: usize) -> std::result::Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to user-friendly messages.
fn map_connection_error(error: sqlx::Error, config: &SourceConfig) -> GaugeError {
    let target = config.display_string();
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        GaugeError::connection(format!(
            "Cannot connect to {target}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        GaugeError::connection(format!(
            "Authentication failed for {target}. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        GaugeError::connection(format!("Database in {target} does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        GaugeError::connection(format!(
            "Connection to {target} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        GaugeError::connection(error.to_string())
    }
}

/// Formats a query error with detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
