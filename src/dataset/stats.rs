//! Column statistics shared by generic and plan-driven KPIs.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;

use crate::db::QueryResult;

/// Numeric aggregation over the coercible values of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
    P95,
}

impl Aggregate {
    /// Parses a lowercase aggregate name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Self::Sum),
            "avg" => Some(Self::Avg),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "p95" => Some(Self::P95),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
            Self::P95 => "p95",
        }
    }

    /// Applies the aggregate; `None` when `values` is empty.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Self::Sum => values.iter().sum(),
            Self::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::P95 => quantile(values, 0.95)?,
        };
        Some(result)
    }
}

/// Coerced numeric values of a column, skipping missing and non-coercible ones.
pub fn numeric_values(result: &QueryResult, index: usize) -> Vec<f64> {
    result
        .column_values(index)
        .filter_map(|value| value.as_f64())
        .collect()
}

/// Aggregates the named column. `None` if the column is absent or has no
/// coercible values.
pub fn aggregate(result: &QueryResult, column: &str, agg: Aggregate) -> Option<f64> {
    let index = result.column_index(column)?;
    agg.apply(&numeric_values(result, index))
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Number of distinct non-missing values in the named column.
pub fn count_distinct(result: &QueryResult, column: &str) -> Option<usize> {
    let index = result.column_index(column)?;
    let distinct: HashSet<String> = result
        .column_values(index)
        .filter_map(|value| value.distinct_key())
        .collect();
    Some(distinct.len())
}

/// Percentage of missing values per column, highest first. Ties keep column order.
pub fn missing_percentages(result: &QueryResult) -> Vec<(String, f64)> {
    let total = result.rows.len();
    let mut shares: Vec<(String, f64)> = result
        .columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            let missing = result
                .column_values(index)
                .filter(|value| value.is_missing())
                .count();
            let pct = if total == 0 {
                0.0
            } else {
                missing as f64 * 100.0 / total as f64
            };
            (column.name.clone(), pct)
        })
        .collect();

    shares.sort_by(|a, b| b.1.total_cmp(&a.1));
    shares
}

/// Earliest and latest timestamp in the named column, parsing text values.
pub fn time_span(result: &QueryResult, column: &str) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let index = result.column_index(column)?;
    result
        .column_values(index)
        .filter_map(|value| value.as_timestamp())
        .fold(None, |span, ts| match span {
            None => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
}

/// The `limit` most frequent non-missing values (display form) with counts.
/// Ties keep first-seen order.
pub fn top_values(result: &QueryResult, column: &str, limit: usize) -> Vec<(String, usize)> {
    let Some(index) = result.column_index(column) else {
        return Vec::new();
    };

    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in result.column_values(index) {
        if value.is_missing() {
            continue;
        }
        let key = value.to_display_string();
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|key| {
            let count = counts.get(&key).copied().unwrap_or(0);
            (key, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}
