//! Upstream source abstraction for Gauge.
//!
//! Provides a trait-based interface for running read-only queries, allowing
//! different database backends to be used interchangeably. Callers are
//! expected to pass every statement through [`crate::safety::check`] first.

mod mock;
mod postgres;
mod sqlite;
mod types;

pub use mock::{FailingDatabaseClient, MockDatabaseClient};
pub use postgres::PostgresClient;
pub use sqlite::SqliteClient;
pub use types::{parse_timestamp, ColumnInfo, QueryResult, Row, Value, ValueKind};

use crate::config::SourceConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported database backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    /// Returns the backend as a string for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Parses a backend from a URL scheme.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Creates a database client for the configured source.
///
/// This is the central factory function for upstream connections.
pub async fn connect(config: &SourceConfig) -> Result<Box<dyn DatabaseClient>> {
    match config.backend()? {
        DatabaseBackend::Postgres => {
            let client = PostgresClient::connect(config).await?;
            Ok(Box::new(client))
        }
        DatabaseBackend::Sqlite => {
            let client = SqliteClient::connect(config).await?;
            Ok(Box::new(client))
        }
    }
}

/// Trait defining the interface for upstream clients.
///
/// All operations are async and return Results with GaugeError.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Executes a SQL query and returns every row.
    async fn execute_query(&self, sql: &str) -> Result<QueryResult>;

    /// Closes the connection.
    async fn close(&self) -> Result<()>;
}
