//! Column type inference.
//!
//! Splits every column of a result into exactly one of time, numeric, or
//! categorical, then promotes text columns that mostly hold dates to time.

use serde::{Deserialize, Serialize};

use crate::db::{QueryResult, Value, ValueKind};

/// Share of a text column's values that must parse as dates for it to count as time.
pub const TIME_PARSE_THRESHOLD: f64 = 0.8;

/// Semantic class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnClass {
    Time,
    Numeric,
    Categorical,
}

/// Disjoint partition of a result's columns, each list in column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnClasses {
    pub time: Vec<String>,
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

impl ColumnClasses {
    /// Returns the class assigned to `column`.
    pub fn class_of(&self, column: &str) -> Option<ColumnClass> {
        let has = |list: &[String]| list.iter().any(|c| c == column);
        if has(&self.time) {
            Some(ColumnClass::Time)
        } else if has(&self.numeric) {
            Some(ColumnClass::Numeric)
        } else if has(&self.categorical) {
            Some(ColumnClass::Categorical)
        } else {
            None
        }
    }

    pub fn is_numeric(&self, column: &str) -> bool {
        self.numeric.iter().any(|c| c == column)
    }
}

/// Classifies every column of `result`.
pub fn classify(result: &QueryResult) -> ColumnClasses {
    let mut classes = ColumnClasses::default();

    for (index, column) in result.columns.iter().enumerate() {
        let class = match result.column_kind(index) {
            Some(kind) if kind.is_temporal() => ColumnClass::Time,
            Some(kind) if kind.is_numeric() => ColumnClass::Numeric,
            Some(ValueKind::Text) if mostly_dates(result, index) => ColumnClass::Time,
            _ => ColumnClass::Categorical,
        };

        let name = column.name.clone();
        match class {
            ColumnClass::Time => classes.time.push(name),
            ColumnClass::Numeric => classes.numeric.push(name),
            ColumnClass::Categorical => classes.categorical.push(name),
        }
    }

    classes
}

/// True when at least [`TIME_PARSE_THRESHOLD`] of all values parse as dates.
/// Missing values count against the share.
fn mostly_dates(result: &QueryResult, index: usize) -> bool {
    if result.rows.is_empty() {
        return false;
    }

    let parsed = result
        .column_values(index)
        .filter(|value| matches!(value, Value::String(_)) && value.as_timestamp().is_some())
        .count();

    parsed as f64 / result.rows.len() as f64 >= TIME_PARSE_THRESHOLD
}
