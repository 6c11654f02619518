//! KPI derivation.
//!
//! Every dataset gets a generic report (row and column counts, numeric
//! summaries, missingness, highlights). When an analysis plan is supplied,
//! each plan KPI is computed per dataset: first through its formula hint,
//! then through the heuristic rule table.

mod formula;
mod generic;
mod heuristic;

pub use formula::{evaluate, Formula};
pub use generic::{generic_report, MAX_NUMERIC_SUMMARIES, MISSING_RISK_TOP, TOP_CATEGORY_VALUES};
pub use heuristic::{
    normalize_text, pick_best_column, resolve, HeuristicRule, Resolution, HEURISTIC_RULES,
};

use serde::{Deserialize, Serialize};

use crate::db::QueryResult;
use crate::plan::KpiSpec;

/// A KPI value: an integer count, a floating-point measure, or text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KpiScalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl KpiScalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }
}

impl From<usize> for KpiScalar {
    fn from(count: usize) -> Self {
        Self::Int(i64::try_from(count).unwrap_or(i64::MAX))
    }
}

impl From<f64> for KpiScalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// A named KPI with an optional note on how it was derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiValue {
    pub name: String,
    pub value: KpiScalar,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl KpiValue {
    pub fn new(name: impl Into<String>, value: impl Into<KpiScalar>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// KPIs, highlights, and risks for one dataset. Order is significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiReport {
    pub dataset_name: String,
    pub kpis: Vec<KpiValue>,
    pub highlights: Vec<String>,
    pub risks: Vec<String>,
}

impl KpiReport {
    pub fn new(dataset_name: impl Into<String>) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            ..Self::default()
        }
    }

    /// Looks up a KPI by name. The first match wins.
    pub fn kpi(&self, name: &str) -> Option<&KpiValue> {
        self.kpis.iter().find(|k| k.name == name)
    }
}

/// Computes one plan KPI against a dataset.
///
/// A formula hint that parses and yields a value wins; anything else falls
/// through to the heuristic rules, which always produce a value.
pub fn compute_plan_kpi(spec: &KpiSpec, data: &QueryResult) -> KpiValue {
    if let Some(hint) = spec.hint() {
        if let Some(formula) = Formula::parse(hint) {
            if let Some(value) = formula.evaluate(data) {
                return match formula {
                    Formula::CountRows => {
                        let name = if spec.name.is_empty() {
                            "count_rows"
                        } else {
                            spec.name.as_str()
                        };
                        KpiValue::new(name, value).with_note("from formula_hint")
                    }
                    _ => KpiValue::new(spec.name.clone(), value)
                        .with_note(format!("from formula_hint: {hint}")),
                };
            }
        }
    }

    resolve(spec, data)
}

/// Computes every plan KPI against a dataset, in plan order.
pub fn compute_plan_kpis(specs: &[KpiSpec], data: &QueryResult) -> Vec<KpiValue> {
    specs.iter().map(|spec| compute_plan_kpi(spec, data)).collect()
}
