//! Mock upstream clients for testing.
//!
//! `MockDatabaseClient` serves canned results keyed by SQL text and records
//! every statement it receives; `FailingDatabaseClient` fails every query.

use super::{DatabaseClient, QueryResult};
use crate::error::{GaugeError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A mock database client that returns predefined results.
#[derive(Default)]
pub struct MockDatabaseClient {
    results: HashMap<String, QueryResult>,
    executed: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock client with no canned results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the result returned for `sql` (matched after trimming
    /// whitespace and trailing terminators).
    pub fn with_result(mut self, sql: &str, result: QueryResult) -> Self {
        self.results.insert(normalize(sql).to_string(), result);
        self
    }

    /// Returns every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

fn normalize(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut log) = self.executed.lock() {
            log.push(sql.to_string());
        }

        self.results
            .get(normalize(sql))
            .cloned()
            .ok_or_else(|| GaugeError::query(format!("no mock result for: {sql}")))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A client whose every query fails, for error-path tests.
pub struct FailingDatabaseClient {
    message: String,
    lost_connection: bool,
}

impl FailingDatabaseClient {
    /// Fails every query with a query error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            lost_connection: false,
        }
    }

    /// Fails every query with a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            lost_connection: true,
        }
    }
}

#[async_trait]
impl DatabaseClient for FailingDatabaseClient {
    async fn execute_query(&self, _sql: &str) -> Result<QueryResult> {
        if self.lost_connection {
            Err(GaugeError::connection(self.message.clone()))
        } else {
            Err(GaugeError::query(self.message.clone()))
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, Value};

    #[tokio::test]
    async fn test_mock_returns_registered_result() {
        let result = QueryResult::with_data(
            vec![ColumnInfo::new("n", "integer")],
            vec![vec![Value::Int(1)]],
        );
        let client = MockDatabaseClient::new().with_result("SELECT 1 AS n", result.clone());

        let got = client.execute_query("  SELECT 1 AS n; ").await.unwrap();
        assert_eq!(got, result);
        assert_eq!(client.executed(), vec!["  SELECT 1 AS n; ".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_unknown_sql_is_query_error() {
        let client = MockDatabaseClient::new();
        let err = client.execute_query("SELECT 2").await.unwrap_err();
        assert!(matches!(err, GaugeError::Query(_)));
    }

    #[tokio::test]
    async fn test_failing_client() {
        let client = FailingDatabaseClient::new("connection reset");
        let err = client.execute_query("SELECT 1").await.unwrap_err();
        assert_eq!(err.to_string(), "Query error: connection reset");

        let client = FailingDatabaseClient::connection("server gone");
        let err = client.execute_query("SELECT 1").await.unwrap_err();
        assert!(matches!(err, GaugeError::Connection(_)));
    }
}
