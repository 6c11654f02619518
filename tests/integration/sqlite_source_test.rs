//! Runs against a real file-backed SQLite source.

use db_gauge::cache::CacheStore;
use db_gauge::config::SourceConfig;
use db_gauge::db::{self, Value};
use db_gauge::engine::{ArtifactExecutionEngine, FailureKind, RunOptions};
use db_gauge::error::GaugeError;
use db_gauge::kpi::KpiScalar;
use db_gauge::plan::SqlArtifact;
use pretty_assertions::assert_eq;
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use tempfile::tempdir;

async fn seed_source(dir: &Path) -> PathBuf {
    let path = dir.join("rewards.db");
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();

    sqlx::query(
        "CREATE TABLE redemptions (
            customer_id INTEGER,
            tier TEXT,
            points REAL,
            redeemed_on TEXT
        )",
    )
    .execute(&pool)
    .await
    .unwrap();

    for (customer, tier, points, day) in [
        (1, "gold", 120.0, "2024-02-01"),
        (2, "silver", 80.0, "2024-02-03"),
        (1, "gold", 40.0, "2024-02-07"),
        (3, "bronze", 10.0, "2024-02-09"),
    ] {
        sqlx::query("INSERT INTO redemptions VALUES (?, ?, ?, ?)")
            .bind(customer)
            .bind(tier)
            .bind(points)
            .bind(day)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("CREATE TABLE members (id INTEGER)")
        .execute(&pool)
        .await
        .unwrap();

    pool.close().await;
    path
}

fn source_config(path: &Path) -> SourceConfig {
    SourceConfig::from_url(&format!("sqlite://{}", path.display())).unwrap()
}

#[tokio::test]
async fn test_run_against_sqlite_source() {
    let dir = tempdir().unwrap();
    let db_path = seed_source(dir.path()).await;
    let cache_dir = dir.path().join("cache");

    let source = db::connect(&source_config(&db_path)).await.unwrap();
    let cache = CacheStore::open(&cache_dir).await.unwrap();

    let artifacts = vec![
        SqlArtifact::new(
            "redemptions",
            "SELECT customer_id, tier, points, redeemed_on FROM redemptions ORDER BY redeemed_on;",
        ),
        SqlArtifact::new("wipe", "DROP TABLE members"),
        SqlArtifact::new("broken", "SELECT missing_column FROM redemptions"),
    ];
    let analysis_plan = json!({"kpis": [
        {"name": "Unique customers", "description": "number of customers redeeming"},
        {"name": "Points redeemed", "formula_hint": "sum(points)"},
        {"name": "", "formula_hint": "count_rows()"}
    ]});

    let engine = ArtifactExecutionEngine::new(source.as_ref(), &cache, RunOptions::default());
    let outcome = engine.run(&artifacts, Some(&analysis_plan)).await.unwrap();

    assert_eq!(outcome.failure("wipe").unwrap().kind, FailureKind::UnsafeQuery);
    assert_eq!(
        outcome.failure("broken").unwrap().kind,
        FailureKind::QueryExecution
    );

    let summary = outcome.bundle.dataset("redemptions").unwrap();
    assert_eq!(summary.row_count, 4);
    assert_eq!(summary.time_columns, vec!["redeemed_on"]);
    assert_eq!(summary.numeric_columns, vec!["customer_id", "points"]);
    assert_eq!(summary.categorical_columns, vec!["tier"]);

    let report = outcome.bundle.report("redemptions").unwrap();
    let unique = report.kpi("Unique customers").unwrap();
    assert_eq!(unique.value, KpiScalar::Int(3));
    assert_eq!(unique.note.as_deref(), Some("heuristic distinct on customer_id"));
    assert_eq!(
        report.kpi("Points redeemed").unwrap().value,
        KpiScalar::Float(250.0)
    );
    let counted = report.kpi("count_rows").unwrap();
    assert_eq!(counted.value, KpiScalar::Int(4));
    assert_eq!(counted.note.as_deref(), Some("from formula_hint"));

    let preview = outcome.preview("redemptions").unwrap();
    assert_eq!(preview.rows.len(), 4);
    assert_eq!(preview.rows[0]["tier"], json!("gold"));

    let cached = cache.get(&summary.cache_key).await.unwrap().unwrap();
    assert_eq!(cached.row_count, 4);
    assert_eq!(cached.rows[3][1], Value::from("bronze"));

    source.close().await.unwrap();
    cache.close().await;
}

#[tokio::test]
async fn test_source_rejects_writes_past_the_gate() {
    let dir = tempdir().unwrap();
    let db_path = seed_source(dir.path()).await;

    let source = db::connect(&source_config(&db_path)).await.unwrap();
    let err = source
        .execute_query("INSERT INTO members VALUES (1)")
        .await
        .unwrap_err();
    assert!(matches!(err, GaugeError::Query(_)));

    let count = source
        .execute_query("SELECT COUNT(*) AS n FROM members")
        .await
        .unwrap();
    assert_eq!(count.rows[0][0], Value::Int(0));
    source.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_source_file_is_connection_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.db");

    let err = db::connect(&source_config(&missing)).await.unwrap_err();
    assert!(matches!(err, GaugeError::Connection(_)));
    assert!(!missing.exists());
}
