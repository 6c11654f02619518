//! The memory document: `<cache_dir>/memory.json`.
//!
//! A free-form JSON object that records the latest execution bundle and
//! analysis plan for downstream tools. Unknown keys written by other tools
//! are preserved.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value as Json};
use tracing::warn;

use crate::engine::ExecutionBundle;
use crate::error::{GaugeError, Result};
use crate::plan::is_empty_plan;

pub const MEMORY_FILE: &str = "memory.json";

pub const EXECUTION_BUNDLE_KEY: &str = "execution_bundle";
pub const ANALYSIS_PLAN_KEY: &str = "analysis_plan";

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    path: PathBuf,
    fields: Map<String, Json>,
}

impl MemoryDocument {
    /// Loads the document from `cache_dir`. A missing, unreadable, or
    /// corrupt file yields an empty document.
    pub fn load(cache_dir: &Path) -> Self {
        let path = cache_dir.join(MEMORY_FILE);
        let fields = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Json>(&text) {
                Ok(Json::Object(fields)) => fields,
                Ok(_) | Err(_) => {
                    warn!("Ignoring unreadable memory document {}", path.display());
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };
        Self { path, fields }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Json) {
        self.fields.insert(key.into(), value);
    }

    /// Records the latest bundle, and the plan when one was used.
    pub fn record_run(&mut self, bundle: &ExecutionBundle, plan: Option<&Json>) -> Result<()> {
        let bundle = serde_json::to_value(bundle)
            .map_err(|e| GaugeError::persistence(format!("Failed to encode bundle: {e}")))?;
        self.set(EXECUTION_BUNDLE_KEY, bundle);

        if let Some(plan) = plan.filter(|p| !is_empty_plan(p)) {
            self.set(ANALYSIS_PLAN_KEY, plan.clone());
        }
        Ok(())
    }

    /// Writes the document as pretty-printed JSON.
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.fields)
            .map_err(|e| GaugeError::persistence(format!("Failed to encode memory document: {e}")))?;
        std::fs::write(&self.path, text).map_err(|e| {
            GaugeError::persistence(format!("Failed to write {}: {e}", self.path.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let doc = MemoryDocument::load(dir.path());
        assert_eq!(doc.get(EXECUTION_BUNDLE_KEY), None);
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(MEMORY_FILE), "{\"half\": ").unwrap();
        let doc = MemoryDocument::load(dir.path());
        assert_eq!(doc.get("half"), None);
    }

    #[test]
    fn test_record_run() {
        let dir = tempdir().unwrap();
        let mut doc = MemoryDocument::load(dir.path());
        doc.record_run(&ExecutionBundle::default(), Some(&json!({}))).unwrap();

        assert_eq!(
            doc.get(EXECUTION_BUNDLE_KEY),
            Some(&json!({"datasets": [], "reports": []}))
        );
        assert_eq!(doc.get(ANALYSIS_PLAN_KEY), None);

        doc.record_run(&ExecutionBundle::default(), Some(&json!({"kpis": []})))
            .unwrap();
        assert_eq!(doc.get(ANALYSIS_PLAN_KEY), Some(&json!({"kpis": []})));
    }

    #[test]
    fn test_save_preserves_other_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(MEMORY_FILE),
            r#"{"db_profile": {"tables": []}}"#,
        )
        .unwrap();

        let mut doc = MemoryDocument::load(dir.path());
        doc.set(EXECUTION_BUNDLE_KEY, json!({"datasets": [], "reports": []}));
        doc.save().unwrap();

        let reloaded = MemoryDocument::load(dir.path());
        assert_eq!(reloaded.get("db_profile"), Some(&json!({"tables": []})));
        assert_eq!(
            reloaded.get(EXECUTION_BUNDLE_KEY),
            Some(&json!({"datasets": [], "reports": []}))
        );
    }
}
