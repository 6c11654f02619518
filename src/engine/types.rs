//! Output types of an engine run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::dataset::ColumnClasses;
use crate::db::QueryResult;
use crate::kpi::KpiReport;

/// What a successful artifact produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub dataset_name: String,
    pub cache_key: String,
    pub storage_location: String,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub time_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

impl DatasetSummary {
    pub fn new(
        dataset_name: &str,
        cache_key: &str,
        storage_location: String,
        data: &QueryResult,
        classes: ColumnClasses,
    ) -> Self {
        Self {
            dataset_name: dataset_name.to_string(),
            cache_key: cache_key.to_string(),
            storage_location,
            row_count: data.row_count,
            column_count: data.columns.len(),
            columns: data.column_names(),
            time_columns: classes.time,
            numeric_columns: classes.numeric,
            categorical_columns: classes.categorical,
        }
    }
}

/// Summaries and reports, paired by position and in artifact order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionBundle {
    pub datasets: Vec<DatasetSummary>,
    pub reports: Vec<KpiReport>,
}

impl ExecutionBundle {
    pub fn dataset(&self, name: &str) -> Option<&DatasetSummary> {
        self.datasets.iter().find(|d| d.dataset_name == name)
    }

    pub fn report(&self, name: &str) -> Option<&KpiReport> {
        self.reports.iter().find(|r| r.dataset_name == name)
    }
}

/// Leading rows of a dataset as JSON records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPreview {
    pub dataset_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Json>>,
}

impl DatasetPreview {
    pub fn new(dataset_name: &str, data: &QueryResult, limit: usize) -> Self {
        let columns = data.column_names();
        let rows = data
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(i, name)| {
                        let value = row.get(i).map(|v| v.to_json()).unwrap_or(Json::Null);
                        (name.clone(), value)
                    })
                    .collect()
            })
            .collect();

        Self {
            dataset_name: dataset_name.to_string(),
            columns,
            rows,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsafeQuery,
    QueryExecution,
    CacheWrite,
    DuplicateDataset,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsafeQuery => "unsafe_query",
            Self::QueryExecution => "query_execution",
            Self::CacheWrite => "cache_write",
            Self::DuplicateDataset => "duplicate_dataset",
        }
    }
}

/// An artifact that was excluded from the bundle, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFailure {
    pub dataset_name: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Everything a run returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub bundle: ExecutionBundle,
    pub previews: Vec<DatasetPreview>,
    pub failures: Vec<ArtifactFailure>,
}

impl RunOutcome {
    pub fn preview(&self, name: &str) -> Option<&DatasetPreview> {
        self.previews.iter().find(|p| p.dataset_name == name)
    }

    pub fn failure(&self, name: &str) -> Option<&ArtifactFailure> {
        self.failures.iter().find(|f| f.dataset_name == name)
    }
}
