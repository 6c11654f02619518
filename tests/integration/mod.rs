//! Integration tests for gauge.
//!
//! PostgreSQL tests require a running database and are skipped unless
//! DATABASE_URL is set.

pub mod cache_test;
pub mod engine_test;
pub mod postgres_source_test;
pub mod sqlite_source_test;
