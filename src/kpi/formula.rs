//! The KPI formula mini-language.
//!
//! ```text
//! expr := ("sum"|"avg"|"min"|"max"|"p95"|"count_distinct") "(" column ")"
//!       | "count_rows" "(" ")"
//! ```
//!
//! Exactly one call, no nesting, case-insensitive. Anything that does not
//! parse or cannot be evaluated is a non-match, never an error.

use std::sync::LazyLock;

use regex::Regex;

use super::KpiScalar;
use crate::dataset::{count_distinct, Aggregate};
use crate::db::QueryResult;

static FORMULA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(sum|avg|min|max|p95|count_distinct)\(([^)]+)\)$|^count_rows\(\)$")
        .expect("formula pattern is valid")
});

/// A parsed formula hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    CountRows,
    CountDistinct(String),
    Aggregate(Aggregate, String),
}

impl Formula {
    /// Parses a hint. Surrounding whitespace is ignored, as are quotes
    /// around the column name.
    pub fn parse(hint: &str) -> Option<Self> {
        let hint = hint.trim();
        let caps = FORMULA.captures(hint)?;

        let Some(function) = caps.get(1) else {
            return Some(Self::CountRows);
        };
        let column = caps.get(2).map(|m| strip_quotes(m.as_str()))?;

        match function.as_str().to_lowercase().as_str() {
            "count_distinct" => Some(Self::CountDistinct(column)),
            other => Aggregate::parse(other).map(|agg| Self::Aggregate(agg, column)),
        }
    }

    /// Evaluates against `data`. `None` for unknown columns and for
    /// aggregates with no numeric values.
    pub fn evaluate(&self, data: &QueryResult) -> Option<KpiScalar> {
        match self {
            Self::CountRows => Some(KpiScalar::from(data.rows.len())),
            Self::CountDistinct(column) => count_distinct(data, column).map(KpiScalar::from),
            Self::Aggregate(agg, column) => {
                crate::dataset::aggregate(data, column, *agg).map(KpiScalar::Float)
            }
        }
    }
}

/// Parses and evaluates `hint` in one step.
pub fn evaluate(hint: &str, data: &QueryResult) -> Option<KpiScalar> {
    Formula::parse(hint)?.evaluate(data)
}

fn strip_quotes(column: &str) -> String {
    column
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string()
}
