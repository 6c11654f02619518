//! Error types for Gauge.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for Gauge operations.
#[derive(Error, Debug)]
pub enum GaugeError {
    /// Upstream connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// SQL rejected by the safety gate. Never executed.
    #[error("Unsafe query: {0}")]
    UnsafeQuery(String),

    /// Query execution errors against the upstream source.
    #[error("Query error: {0}")]
    Query(String),

    /// Writing a dataset file or its index row failed.
    #[error("Cache write error: {0}")]
    CacheWrite(String),

    /// Cache index or local state errors (open, migrate, read).
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Plan-level KPI computation failure.
    #[error("Plan error: {0}")]
    Plan(String),

    /// Artifact or plan documents that cannot be read or parsed.
    #[error("Invalid input: {0}")]
    Input(String),

    /// Configuration errors (invalid config file, bad source URL, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GaugeError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates an unsafe query error with the given message.
    pub fn unsafe_query(msg: impl Into<String>) -> Self {
        Self::UnsafeQuery(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a cache write error with the given message.
    pub fn cache_write(msg: impl Into<String>) -> Self {
        Self::CacheWrite(msg.into())
    }

    /// Creates a persistence error with the given message.
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Creates a plan error with the given message.
    pub fn plan(msg: impl Into<String>) -> Self {
        Self::Plan(msg.into())
    }

    /// Creates an input error with the given message.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::UnsafeQuery(_) => "Unsafe Query",
            Self::Query(_) => "Query Error",
            Self::CacheWrite(_) => "Cache Write Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Plan(_) => "Plan Error",
            Self::Input(_) => "Input Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using GaugeError.
pub type Result<T> = std::result::Result<T, GaugeError>;
