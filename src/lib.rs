//! gauge - read-only SQL artifacts to cached datasets and KPI reports.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod cache;
pub mod config;
pub mod dataset;
pub mod db;
pub mod engine;
pub mod error;
pub mod kpi;
pub mod memory;
pub mod plan;
pub mod safety;
