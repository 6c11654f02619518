//! Runs against PostgreSQL.
//!
//! Skipped unless DATABASE_URL is set.

use db_gauge::cache::CacheStore;
use db_gauge::config::SourceConfig;
use db_gauge::db::{DatabaseClient, PostgresClient};
use db_gauge::engine::{ArtifactExecutionEngine, RunOptions};
use db_gauge::kpi::KpiScalar;
use db_gauge::plan::SqlArtifact;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::tempdir;

async fn get_test_client() -> Option<PostgresClient> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let config = SourceConfig::from_url(&url).ok()?;
    PostgresClient::connect(&config).await.ok()
}

const SERIES_SQL: &str = "SELECT g AS user_id, (g * 2.5)::numeric AS amount, \
     DATE '2024-01-01' + g AS day, CASE WHEN g % 2 = 0 THEN 'even' ELSE 'odd' END AS parity \
     FROM generate_series(1, 20) AS g";

#[tokio::test]
async fn test_run_against_postgres() {
    let Some(client) = get_test_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let dir = tempdir().unwrap();
    let cache = CacheStore::open(dir.path()).await.unwrap();

    let analysis_plan = json!({"kpis": [
        {"name": "Total users"},
        {"name": "Spend", "formula_hint": "sum(amount)"}
    ]});
    let engine = ArtifactExecutionEngine::new(&client, &cache, RunOptions::default());
    let outcome = engine
        .run(
            &[
                SqlArtifact::new("series", SERIES_SQL),
                SqlArtifact::new("drop", "DROP TABLE IF EXISTS gauge_never_created"),
            ],
            Some(&analysis_plan),
        )
        .await
        .unwrap();

    assert_eq!(outcome.failures.len(), 1);
    let summary = outcome.bundle.dataset("series").unwrap();
    assert_eq!(summary.row_count, 20);
    assert_eq!(summary.time_columns, vec!["day"]);
    assert_eq!(summary.categorical_columns, vec!["parity"]);

    let report = outcome.bundle.report("series").unwrap();
    assert_eq!(report.kpi("Total users").unwrap().value, KpiScalar::Int(20));
    assert_eq!(report.kpi("Spend").unwrap().value, KpiScalar::Float(525.0));

    let cached = cache.get(&summary.cache_key).await.unwrap().unwrap();
    assert_eq!(cached.rows, client.execute_query(SERIES_SQL).await.unwrap().rows);

    client.close().await.unwrap();
    cache.close().await;
}
