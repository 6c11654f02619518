//! End-to-end runs of the artifact engine over a mock source.

use chrono::NaiveDate;
use db_gauge::cache::CacheStore;
use db_gauge::db::{ColumnInfo, MockDatabaseClient, QueryResult, Value};
use db_gauge::engine::{ArtifactExecutionEngine, FailureKind, RunOptions};
use db_gauge::kpi::KpiScalar;
use db_gauge::memory::{MemoryDocument, ANALYSIS_PLAN_KEY, EXECUTION_BUNDLE_KEY};
use db_gauge::plan::{self, SqlArtifact};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

const SALES_SQL: &str = "SELECT amount, region, sold_at FROM sales";

/// 100 sales with amounts 1..=100, four regions, one per hour.
fn sales() -> QueryResult {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let regions = ["north", "south", "east", "west"];
    QueryResult::with_data(
        vec![
            ColumnInfo::new("amount", "FLOAT8"),
            ColumnInfo::new("region", "TEXT"),
            ColumnInfo::new("sold_at", "TIMESTAMP"),
        ],
        (1..=100i64)
            .map(|i| {
                vec![
                    Value::Float(i as f64),
                    Value::from(regions[(i % 4) as usize]),
                    Value::Timestamp(start + chrono::Duration::hours(i - 1)),
                ]
            })
            .collect(),
    )
}

fn members() -> QueryResult {
    QueryResult::with_data(
        vec![
            ColumnInfo::new("member_id", "INT8"),
            ColumnInfo::new("points", "INT8"),
        ],
        vec![
            vec![Value::Int(7), Value::Int(100)],
            vec![Value::Int(7), Value::Int(50)],
            vec![Value::Int(9), Value::Int(25)],
        ],
    )
}

fn source() -> MockDatabaseClient {
    MockDatabaseClient::new()
        .with_result(SALES_SQL, sales())
        .with_result("SELECT member_id, points FROM ledger", members())
}

#[tokio::test]
async fn test_sales_run_with_plan() {
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();
    let source = source();

    let artifacts = plan::parse_artifacts(
        r#"Here is the plan:
```json
{"artifacts": [
  {"dataset_name": "sales", "sql": "SELECT amount, region, sold_at FROM sales;"},
  {"dataset_name": "users", "sql": "DELETE FROM users"}
]}
```"#,
    )
    .unwrap();
    let analysis_plan =
        plan::parse_plan(r#"{"kpis": [{"name": "Total Sales", "formula_hint": "sum(amount)"}]}"#)
            .unwrap();

    let engine = ArtifactExecutionEngine::new(&source, &cache, RunOptions::default());
    let outcome = engine.run(&artifacts, Some(&analysis_plan)).await.unwrap();

    assert_eq!(outcome.bundle.datasets.len(), 1);
    assert_eq!(outcome.bundle.reports.len(), 1);
    assert_eq!(outcome.failure("users").unwrap().kind, FailureKind::UnsafeQuery);
    assert_eq!(source.executed(), vec![SALES_SQL.to_string()]);

    let failures = serde_json::to_value(&outcome.failures).unwrap();
    assert_eq!(failures[0]["dataset_name"], json!("users"));
    assert_eq!(failures[0]["kind"], json!("unsafe_query"));
    assert!(failures[0]["message"]
        .as_str()
        .unwrap()
        .starts_with("artifact 'users' rejected"));

    let summary = outcome.bundle.dataset("sales").unwrap();
    assert_eq!(summary.row_count, 100);
    assert_eq!(summary.time_columns, vec!["sold_at"]);
    assert_eq!(summary.numeric_columns, vec!["amount"]);
    assert_eq!(summary.categorical_columns, vec!["region"]);

    let report = outcome.bundle.report("sales").unwrap();
    let names: Vec<&str> = report.kpis.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["rows", "columns", "amount__sum", "amount__avg", "amount__p95", "Total Sales"]
    );
    assert_eq!(report.kpi("rows").unwrap().value, KpiScalar::Int(100));
    assert_eq!(report.kpi("amount__sum").unwrap().value, KpiScalar::Float(5050.0));
    assert_eq!(report.kpi("amount__avg").unwrap().value, KpiScalar::Float(50.5));

    let total = report.kpi("Total Sales").unwrap();
    assert_eq!(total.value, KpiScalar::Float(5050.0));
    assert_eq!(total.note.as_deref(), Some("from formula_hint: sum(amount)"));

    assert!(report.risks.is_empty());
    assert!(report
        .highlights
        .iter()
        .any(|h| h.starts_with("Time column `sold_at` spans")));
    assert!(report
        .highlights
        .contains(&"Top `region`: south(25), east(25), west(25), north(25)".to_string()));

    let cached = cache.get(&summary.cache_key).await.unwrap().unwrap();
    assert_eq!(cached, sales());
    cache.close().await;
}

#[tokio::test]
async fn test_revenue_without_identifier_sums_measure() {
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();
    let source = source();

    let analysis_plan = json!({"kpis": [{"name": "Total revenue", "description": "all sales"}]});
    let engine = ArtifactExecutionEngine::new(&source, &cache, RunOptions::default());
    let outcome = engine
        .run(&[SqlArtifact::new("sales", SALES_SQL)], Some(&analysis_plan))
        .await
        .unwrap();

    let kpi = outcome.bundle.reports[0].kpi("Total revenue").unwrap();
    assert_eq!(kpi.value, KpiScalar::Float(5050.0));
    assert_eq!(kpi.note.as_deref(), Some("heuristic sum(amount)"));
    cache.close().await;
}

#[tokio::test]
async fn test_plan_kpis_apply_to_every_dataset() {
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();
    let source = source();

    let analysis_plan = json!({"kpis": [
        {"name": "Active members"},
        {"name": "Points earned", "formula_hint": "sum(points)"}
    ]});
    let engine = ArtifactExecutionEngine::new(&source, &cache, RunOptions::default());
    let outcome = engine
        .run(
            &[
                SqlArtifact::new("ledger", "SELECT member_id, points FROM ledger"),
                SqlArtifact::new("sales", SALES_SQL),
            ],
            Some(&analysis_plan),
        )
        .await
        .unwrap();

    let order: Vec<&str> = outcome
        .bundle
        .datasets
        .iter()
        .map(|d| d.dataset_name.as_str())
        .collect();
    assert_eq!(order, vec!["ledger", "sales"]);

    let ledger = outcome.bundle.report("ledger").unwrap();
    let active = ledger.kpi("Active members").unwrap();
    assert_eq!(active.value, KpiScalar::Int(2));
    assert_eq!(active.note.as_deref(), Some("heuristic active distinct on member_id"));
    assert_eq!(
        ledger.kpi("Points earned").unwrap().value,
        KpiScalar::Float(175.0)
    );

    // sales has no points column, so the hint yields nothing and the
    // measure rule picks the best remaining column.
    let sales = outcome.bundle.report("sales").unwrap();
    assert_eq!(
        sales.kpi("Points earned").unwrap().note.as_deref(),
        Some("heuristic sum(amount)")
    );
    cache.close().await;
}

#[tokio::test]
async fn test_unreadable_plan_keeps_generic_kpis() {
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();
    let source = source();

    let analysis_plan = json!({"kpis": "total sales please"});
    let engine = ArtifactExecutionEngine::new(&source, &cache, RunOptions::default());
    let outcome = engine
        .run(
            &[
                SqlArtifact::new("sales", SALES_SQL),
                SqlArtifact::new("ledger", "SELECT member_id, points FROM ledger"),
            ],
            Some(&analysis_plan),
        )
        .await
        .unwrap();

    for report in &outcome.bundle.reports {
        assert!(report.kpi("rows").is_some());
        assert_eq!(
            report.risks.last().map(String::as_str),
            Some("Planner-driven KPI computation failed: `kpis` must be a list, got a string")
        );
    }
    cache.close().await;
}

#[tokio::test]
async fn test_memory_records_latest_run() {
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();
    let source = source();

    let analysis_plan = json!({"kpis": [{"name": "Total Sales", "formula_hint": "sum(amount)"}]});
    let engine = ArtifactExecutionEngine::new(&source, &cache, RunOptions::default());
    let outcome = engine
        .run(&[SqlArtifact::new("sales", SALES_SQL)], Some(&analysis_plan))
        .await
        .unwrap();
    cache.close().await;

    let mut memory = MemoryDocument::load(dir.path());
    memory.record_run(&outcome.bundle, Some(&analysis_plan)).unwrap();
    memory.save().unwrap();

    let reloaded = MemoryDocument::load(dir.path());
    assert_eq!(reloaded.get(ANALYSIS_PLAN_KEY), Some(&analysis_plan));
    let bundle = reloaded.get(EXECUTION_BUNDLE_KEY).unwrap();
    assert_eq!(bundle["datasets"][0]["dataset_name"], json!("sales"));
    assert_eq!(bundle["reports"][0]["kpis"][0], json!({"name": "rows", "value": 100}));
}
