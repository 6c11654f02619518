//! Dataset cache.
//!
//! Results are stored as Parquet files under `<dir>/parquet/` and indexed in
//! `<dir>/cache.db`. A put writes the file first and indexes it second, so
//! every index row points at a complete file.

mod columnar;
mod index;
mod migrations;

pub use columnar::{read_dataset, to_record_batch, write_dataset, SOURCE_TYPE_KEY};
pub use index::{CacheEntry, CacheIndex};

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::db::QueryResult;
use crate::error::{GaugeError, Result};

/// Hex characters of the SQL digest kept in derived keys.
pub const KEY_HASH_CHARS: usize = 12;

const INDEX_FILE: &str = "cache.db";
const DATASET_DIR: &str = "parquet";
const DATASET_EXTENSION: &str = "parquet";

/// Derives `{namespace}_{hash}` from the trimmed SQL text.
pub fn derive_key(namespace: &str, sql: &str) -> String {
    let digest = hex_digest(sql.trim());
    format!("{namespace}_{}", &digest[..KEY_HASH_CHARS])
}

fn hex_digest(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A filesystem-safe file stem for `key`. Keys that needed rewriting get a
/// digest suffix so two keys never share a file.
fn file_stem(key: &str) -> String {
    let safe: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe == key && !safe.is_empty() {
        safe
    } else {
        format!("{safe}-{}", &hex_digest(key)[..8])
    }
}

/// Owns the dataset directory and its index.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    index: CacheIndex,
}

impl CacheStore {
    /// Opens the cache rooted at `dir`, creating it when missing.
    pub async fn open(dir: &Path) -> Result<Self> {
        let dataset_dir = dir.join(DATASET_DIR);
        std::fs::create_dir_all(&dataset_dir).map_err(|e| {
            GaugeError::persistence(format!(
                "Failed to create cache directory {}: {e}",
                dataset_dir.display()
            ))
        })?;

        let index = CacheIndex::open(&dir.join(INDEX_FILE)).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            index,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the dataset for `key` is written.
    pub fn dataset_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(DATASET_DIR)
            .join(format!("{}.{DATASET_EXTENSION}", file_stem(key)))
    }

    /// Stores `data` under `key` and returns its storage location.
    ///
    /// A failed file write leaves the index untouched.
    pub async fn put(&self, key: &str, data: &QueryResult) -> Result<String> {
        let path = self.dataset_path(key);
        let bytes = write_dataset(&path, data).await?;
        let location = path.display().to_string();

        self.index.upsert(key, &location).await?;
        debug!("Cached {} ({} rows, {} bytes) at {}", key, data.row_count, bytes, location);
        Ok(location)
    }

    /// Loads the dataset for `key`. `None` when the key is unknown or its
    /// file has gone missing.
    pub async fn get(&self, key: &str) -> Result<Option<QueryResult>> {
        let Some(entry) = self.index.get(key).await? else {
            return Ok(None);
        };

        let path = Path::new(&entry.storage_location);
        if !path.exists() {
            warn!(
                "Cache entry {} points at missing file {}; treating as not cached",
                key, entry.storage_location
            );
            return Ok(None);
        }

        read_dataset(path).await.map(Some)
    }

    pub async fn entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.index.get(key).await
    }

    pub async fn list_entries(&self) -> Result<Vec<CacheEntry>> {
        self.index.list().await
    }

    /// Closes the index. Call once at shutdown.
    pub async fn close(&self) {
        self.index.close().await;
    }
}
