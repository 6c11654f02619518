//! SQLite index mapping cache keys to dataset files.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{info, warn};

use super::migrations;
use crate::error::{GaugeError, Result};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// One index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CacheEntry {
    pub cache_key: String,
    pub created_at: String,
    pub storage_location: String,
}

/// The index database. Only the cache store writes to it.
#[derive(Debug)]
pub struct CacheIndex {
    pool: SqlitePool,
    path: PathBuf,
}

impl CacheIndex {
    /// Opens or creates the index, migrating it to the current schema.
    ///
    /// An index that cannot be opened is moved aside to `*.db.bak` and
    /// recreated; the dataset files stay where they are.
    pub async fn open(path: &Path) -> Result<Self> {
        match Self::try_open(path).await {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!("Failed to open cache index: {e}. Attempting recovery...");
                Self::attempt_recovery(path).await
            }
        }
    }

    async fn try_open(path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match Self::connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Cache index opened at {}", path.display());
                    return Ok(Self {
                        pool,
                        path: path.to_path_buf(),
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| GaugeError::persistence("Failed to open cache index after retries")))
    }

    async fn connect(path: &Path) -> Result<SqlitePool> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&conn_str)
            .map_err(|e| GaugeError::persistence(format!("Invalid index path: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| GaugeError::persistence(format!("Failed to connect to cache index: {e}")))
    }

    async fn attempt_recovery(path: &Path) -> Result<Self> {
        let backup_path = path.with_extension("db.bak");

        if path.exists() {
            std::fs::rename(path, &backup_path).map_err(|e| {
                GaugeError::persistence(format!(
                    "Failed to back up unreadable cache index to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up unreadable cache index to {}", backup_path.display());
        }

        Self::try_open(path).await.map_err(|e| {
            GaugeError::persistence(format!("Failed to recreate cache index after backup: {e}"))
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Inserts or replaces the row for `key` in one statement.
    pub async fn upsert(&self, key: &str, storage_location: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cached_queries (cache_key, storage_location, created_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(cache_key) DO UPDATE SET
                storage_location = excluded.storage_location,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(storage_location)
        .execute(&self.pool)
        .await
        .map_err(|e| GaugeError::cache_write(format!("Failed to index {key}: {e}")))?;

        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        sqlx::query_as::<_, CacheEntry>(
            "SELECT cache_key, created_at, storage_location FROM cached_queries WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| GaugeError::persistence(format!("Failed to read cache index: {e}")))
    }

    /// All rows, newest first.
    pub async fn list(&self) -> Result<Vec<CacheEntry>> {
        sqlx::query_as::<_, CacheEntry>(
            r#"
            SELECT cache_key, created_at, storage_location
            FROM cached_queries
            ORDER BY created_at DESC, cache_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GaugeError::persistence(format!("Failed to list cache index: {e}")))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_upsert_replaces_location() {
        let dir = tempdir().unwrap();
        let index = CacheIndex::open(&dir.path().join("cache.db")).await.unwrap();

        index.upsert("ds_1", "/a.parquet").await.unwrap();
        index.upsert("ds_1", "/b.parquet").await.unwrap();
        index.upsert("ds_2", "/c.parquet").await.unwrap();

        let entry = index.get("ds_1").await.unwrap().unwrap();
        assert_eq!(entry.storage_location, "/b.parquet");
        assert!(!entry.created_at.is_empty());
        assert_eq!(index.list().await.unwrap().len(), 2);
        assert_eq!(index.get("nope").await.unwrap(), None);

        index.close().await;
    }

    #[tokio::test]
    async fn test_open_recovers_from_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::fs::write(&path, b"this is not a sqlite database at all, not even close").unwrap();

        let index = CacheIndex::open(&path).await.unwrap();
        assert!(path.with_extension("db.bak").exists());
        assert!(index.list().await.unwrap().is_empty());

        index.close().await;
    }
}
