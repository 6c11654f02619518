//! Artifact execution engine.
//!
//! Runs artifacts one at a time, in the order given:
//! gate, execute, classify, cache, summarize, generic KPIs. Plan-driven KPIs
//! are computed once every artifact has run. An artifact that fails is left
//! out of the bundle and reported in [`RunOutcome::failures`]; its siblings
//! carry on.

mod types;

pub use types::{
    ArtifactFailure, DatasetPreview, DatasetSummary, ExecutionBundle, FailureKind, RunOutcome,
};

use std::collections::HashSet;
use std::time::Instant;

use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheStore};
use crate::config::Config;
use crate::dataset::classify;
use crate::db::{DatabaseClient, QueryResult};
use crate::error::{GaugeError, Result};
use crate::kpi::{compute_plan_kpis, generic_report, KpiReport};
use crate::plan::{is_empty_plan, KpiPlan, SqlArtifact};
use crate::safety;

/// Per-run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Prefix for derived cache keys.
    pub namespace: String,
    /// Rows kept in each dataset preview.
    pub preview_rows: usize,
    /// Abort the run on the first gate rejection.
    pub strict_gate: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            namespace: "ds".to_string(),
            preview_rows: 50,
            strict_gate: false,
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.cache.namespace.clone(),
            preview_rows: config.run.preview_rows,
            strict_gate: config.run.strict_gate,
        }
    }
}

/// Turns SQL artifacts into cached datasets and KPI reports.
pub struct ArtifactExecutionEngine<'a> {
    source: &'a dyn DatabaseClient,
    cache: &'a CacheStore,
    options: RunOptions,
}

/// A successfully processed artifact, kept until plan KPIs are merged.
struct Processed {
    summary: DatasetSummary,
    report: KpiReport,
    preview: DatasetPreview,
    data: QueryResult,
}

impl<'a> ArtifactExecutionEngine<'a> {
    pub fn new(source: &'a dyn DatabaseClient, cache: &'a CacheStore, options: RunOptions) -> Self {
        Self {
            source,
            cache,
            options,
        }
    }

    /// Runs every artifact, then merges plan-driven KPIs when a plan is given.
    ///
    /// Returns an error only for run-level failures: a gate rejection in
    /// strict mode or a lost connection to the source.
    pub async fn run(&self, artifacts: &[SqlArtifact], plan: Option<&Json>) -> Result<RunOutcome> {
        let mut processed: Vec<Processed> = Vec::new();
        let mut failures: Vec<ArtifactFailure> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();

        info!("Running {} artifact(s)", artifacts.len());

        for artifact in artifacts {
            let name = artifact.dataset_name.as_str();

            if seen.contains(name) {
                failures.push(self.fail(
                    name,
                    FailureKind::DuplicateDataset,
                    format!("dataset name '{name}' is already used in this run"),
                ));
                continue;
            }

            match self.process(artifact).await {
                Ok(done) => {
                    seen.insert(name);
                    processed.push(done);
                }
                Err(ArtifactError::Fatal(e)) => return Err(e),
                Err(ArtifactError::Skipped(kind, message)) => {
                    failures.push(self.fail(name, kind, message));
                }
            }
        }

        if let Some(plan) = plan.filter(|p| !is_empty_plan(p)) {
            merge_plan_kpis(plan, &mut processed);
        }

        let mut outcome = RunOutcome {
            failures,
            ..RunOutcome::default()
        };
        for done in processed {
            outcome.bundle.datasets.push(done.summary);
            outcome.bundle.reports.push(done.report);
            outcome.previews.push(done.preview);
        }

        info!(
            "Run finished: {} dataset(s), {} failure(s)",
            outcome.bundle.datasets.len(),
            outcome.failures.len()
        );
        Ok(outcome)
    }

    async fn process(&self, artifact: &SqlArtifact) -> std::result::Result<Processed, ArtifactError> {
        let name = artifact.dataset_name.as_str();

        if let Err(rejection) = safety::check(&artifact.sql) {
            let message = format!("artifact '{name}' rejected: {rejection}");
            if self.options.strict_gate {
                return Err(ArtifactError::Fatal(GaugeError::unsafe_query(message)));
            }
            return Err(ArtifactError::Skipped(FailureKind::UnsafeQuery, message));
        }

        let sql = safety::normalize(&artifact.sql);
        let cache_key = artifact
            .explicit_cache_key()
            .map(str::to_string)
            .unwrap_or_else(|| derive_key(&self.options.namespace, sql));

        info!("[{}] executing query (cache key {})", name, cache_key);
        let started = Instant::now();
        let data = match self.source.execute_query(sql).await {
            Ok(data) => data,
            Err(e @ GaugeError::Connection(_)) => return Err(ArtifactError::Fatal(e)),
            Err(e) => {
                return Err(ArtifactError::Skipped(
                    FailureKind::QueryExecution,
                    e.to_string(),
                ))
            }
        };
        debug!(
            "[{}] {} row(s) in {:?}",
            name,
            data.row_count,
            started.elapsed()
        );

        let missing: Vec<&str> = artifact
            .expected_columns
            .iter()
            .filter(|c| data.column_index(c).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            warn!("[{}] expected column(s) not returned: {}", name, missing.join(", "));
        }

        let classes = classify(&data);

        let storage_location = self
            .cache
            .put(&cache_key, &data)
            .await
            .map_err(|e| ArtifactError::Skipped(FailureKind::CacheWrite, e.to_string()))?;
        info!("[{}] cached at {}", name, storage_location);

        let report = generic_report(name, &data, &classes);
        let preview = DatasetPreview::new(name, &data, self.options.preview_rows);
        let summary = DatasetSummary::new(name, &cache_key, storage_location, &data, classes);

        Ok(Processed {
            summary,
            report,
            preview,
            data,
        })
    }

    fn fail(&self, name: &str, kind: FailureKind, message: String) -> ArtifactFailure {
        warn!("[{}] skipped ({}): {}", name, kind.as_str(), message);
        ArtifactFailure {
            dataset_name: name.to_string(),
            kind,
            message,
        }
    }
}

enum ArtifactError {
    /// Ends the whole run.
    Fatal(GaugeError),
    /// Excludes this artifact only.
    Skipped(FailureKind, String),
}

/// Appends plan KPIs to every report. A plan that cannot be read leaves the
/// generic KPIs alone and adds a risk note to every report instead.
fn merge_plan_kpis(plan: &Json, processed: &mut [Processed]) {
    match KpiPlan::from_value(plan) {
        Ok(plan) => {
            for done in processed.iter_mut() {
                let kpis = compute_plan_kpis(&plan.kpis, &done.data);
                debug!("[{}] {} plan KPI(s)", done.summary.dataset_name, kpis.len());
                done.report.kpis.extend(kpis);
            }
        }
        Err(e) => {
            let reason = match e {
                GaugeError::Plan(message) => message,
                other => other.to_string(),
            };
            warn!("Planner-driven KPI computation failed: {}", reason);
            for done in processed.iter_mut() {
                done.report
                    .risks
                    .push(format!("Planner-driven KPI computation failed: {reason}"));
            }
        }
    }
}
