//! Integration tests for the dataset cache.

use chrono::NaiveDate;
use db_gauge::cache::{derive_key, CacheStore};
use db_gauge::db::{ColumnInfo, QueryResult, Value};
use pretty_assertions::assert_eq;
use tempfile::tempdir;

fn orders(rows: i64) -> QueryResult {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    QueryResult::with_data(
        vec![
            ColumnInfo::new("order_id", "INT8"),
            ColumnInfo::new("total", "FLOAT8"),
            ColumnInfo::new("channel", "TEXT"),
            ColumnInfo::new("placed_at", "TIMESTAMP"),
        ],
        (0..rows)
            .map(|i| {
                vec![
                    Value::Int(i),
                    Value::Float(i as f64 * 1.5),
                    if i % 3 == 0 { Value::Null } else { Value::from("web") },
                    Value::Timestamp(day.and_hms_opt(0, 0, 0).unwrap() + chrono::Duration::hours(i)),
                ]
            })
            .collect(),
    )
}

#[tokio::test]
async fn test_dataset_survives_reopen() {
    let dir = tempdir().unwrap();
    let key = derive_key("ds", "SELECT * FROM orders");

    let store = CacheStore::open(dir.path()).await.unwrap();
    let location = store.put(&key, &orders(25)).await.unwrap();
    store.close().await;

    let reopened = CacheStore::open(dir.path()).await.unwrap();
    let entry = reopened.entry(&key).await.unwrap().unwrap();
    assert_eq!(entry.storage_location, location);

    let loaded = reopened.get(&key).await.unwrap().unwrap();
    assert_eq!(loaded, orders(25));
    reopened.close().await;
}

#[tokio::test]
async fn test_overwrite_replaces_dataset() {
    let dir = tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();

    store.put("daily", &orders(10)).await.unwrap();
    store.put("daily", &orders(3)).await.unwrap();

    let loaded = store.get("daily").await.unwrap().unwrap();
    assert_eq!(loaded.row_count, 3);
    assert_eq!(store.list_entries().await.unwrap().len(), 1);
    store.close().await;
}

#[tokio::test]
async fn test_unknown_and_deleted_keys_are_not_cached() {
    let dir = tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();

    assert_eq!(store.get("never_written").await.unwrap(), None);

    let location = store.put("gone", &orders(2)).await.unwrap();
    std::fs::remove_file(&location).unwrap();
    assert_eq!(store.get("gone").await.unwrap(), None);
    store.close().await;
}

#[tokio::test]
async fn test_keys_with_path_characters_stay_inside_cache() {
    let dir = tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();

    let location = store.put("../escape/attempt", &orders(1)).await.unwrap();
    assert!(std::path::Path::new(&location).starts_with(dir.path()));
    assert!(store.get("../escape/attempt").await.unwrap().is_some());
    store.close().await;
}

#[tokio::test]
async fn test_empty_result_is_cached() {
    let dir = tempdir().unwrap();
    let store = CacheStore::open(dir.path()).await.unwrap();

    let empty = orders(0);
    store.put("empty", &empty).await.unwrap();

    let loaded = store.get("empty").await.unwrap().unwrap();
    assert_eq!(loaded.row_count, 0);
    assert_eq!(
        loaded.column_names(),
        vec!["order_id", "total", "channel", "placed_at"]
    );
    store.close().await;
}
