//! Run inputs: SQL artifacts and the KPI analysis plan.
//!
//! Both documents may arrive as raw JSON or as planner text that wraps JSON
//! (see [`extract_json_candidate`]). Artifacts are parsed strictly; the plan
//! is kept as a JSON value and interpreted leniently when KPIs are computed.

mod parser;

pub use parser::{extract_json_candidate, strip_think};

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{GaugeError, Result};

/// Chars of a bad candidate echoed back in parse errors.
const SNIPPET_CHARS: usize = 500;

/// A named, read-only SQL query whose result becomes a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlArtifact {
    pub dataset_name: String,
    #[serde(default)]
    pub description: String,
    pub sql: String,
    /// Advisory only; never checked against the actual result.
    #[serde(default)]
    pub expected_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl SqlArtifact {
    pub fn new(dataset_name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            description: String::new(),
            sql: sql.into(),
            expected_columns: Vec::new(),
            cache_key: None,
        }
    }

    /// The supplied cache key, ignoring blank values.
    pub fn explicit_cache_key(&self) -> Option<&str> {
        self.cache_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArtifactDocument {
    Wrapped { artifacts: Vec<SqlArtifact> },
    Bare(Vec<SqlArtifact>),
}

/// Parses an artifact document: `{"artifacts": [...]}` or a bare list.
pub fn parse_artifacts(text: &str) -> Result<Vec<SqlArtifact>> {
    let candidate = extract_json_candidate(text);
    if candidate.is_empty() {
        return Err(GaugeError::input("artifact document is empty"));
    }

    let document: ArtifactDocument = serde_json::from_str(&candidate).map_err(|e| {
        GaugeError::input(format!(
            "invalid artifact document: {e}. Candidate starts with: {}",
            snippet(&candidate)
        ))
    })?;

    Ok(match document {
        ArtifactDocument::Wrapped { artifacts } => artifacts,
        ArtifactDocument::Bare(artifacts) => artifacts,
    })
}

/// Parses a plan document into a JSON value. Its KPIs are read later with
/// [`KpiPlan::from_value`].
pub fn parse_plan(text: &str) -> Result<Json> {
    let candidate = extract_json_candidate(text);
    if candidate.is_empty() {
        return Err(GaugeError::input("plan document is empty"));
    }

    serde_json::from_str(&candidate).map_err(|e| {
        GaugeError::input(format!(
            "invalid plan document: {e}. Candidate starts with: {}",
            snippet(&candidate)
        ))
    })
}

/// Reads and parses an artifact file.
pub fn load_artifacts(path: &Path) -> Result<Vec<SqlArtifact>> {
    parse_artifacts(&read_document(path)?)
}

/// Reads and parses a plan file.
pub fn load_plan(path: &Path) -> Result<Json> {
    parse_plan(&read_document(path)?)
}

fn read_document(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| GaugeError::input(format!("cannot read {}: {e}", path.display())))
}

fn snippet(candidate: &str) -> String {
    candidate
        .chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', "\\n")
}

/// A KPI requested by the plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiSpec {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_hint: Option<String>,
}

impl KpiSpec {
    /// The trimmed formula hint, or `None` when absent or blank.
    pub fn hint(&self) -> Option<&str> {
        self.formula_hint
            .as_deref()
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
    }

    fn from_entry(index: usize, entry: &Json) -> Result<Self> {
        let Json::Object(fields) = entry else {
            return Err(GaugeError::plan(format!(
                "kpis[{index}] is not an object: {entry}"
            )));
        };

        Ok(Self {
            name: text_field(fields.get("name")),
            description: text_field(fields.get("description")),
            formula_hint: match fields.get("formula_hint") {
                Some(Json::String(hint)) => Some(hint.clone()),
                _ => None,
            },
        })
    }
}

/// Missing and null become empty; other non-strings use their JSON text.
fn text_field(value: Option<&Json>) -> String {
    match value {
        None | Some(Json::Null) => String::new(),
        Some(Json::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    }
}

/// The KPI list of an analysis plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KpiPlan {
    pub kpis: Vec<KpiSpec>,
}

impl KpiPlan {
    /// Reads the `kpis` list from a plan value.
    ///
    /// A missing or null `kpis` is an empty plan. A plan that is not an
    /// object, a `kpis` that is not a list, or an entry that is not an
    /// object is a plan-level error.
    pub fn from_value(plan: &Json) -> Result<Self> {
        let Json::Object(fields) = plan else {
            return Err(GaugeError::plan(format!(
                "plan must be a JSON object, got {}",
                json_type(plan)
            )));
        };

        let kpis = match fields.get("kpis") {
            None | Some(Json::Null) => Vec::new(),
            Some(Json::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| KpiSpec::from_entry(index, entry))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(GaugeError::plan(format!(
                    "`kpis` must be a list, got {}",
                    json_type(other)
                )))
            }
        };

        Ok(Self { kpis })
    }
}

/// True for plans that carry nothing: null, `{}`, `[]`, `""`, `false`.
pub fn is_empty_plan(plan: &Json) -> bool {
    match plan {
        Json::Null => true,
        Json::Bool(b) => !b,
        Json::String(s) => s.is_empty(),
        Json::Array(items) => items.is_empty(),
        Json::Object(fields) => fields.is_empty(),
        Json::Number(_) => false,
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "a list",
        Json::Object(_) => "an object",
    }
}
