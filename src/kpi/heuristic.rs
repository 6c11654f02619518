//! Heuristic KPI resolution from a KPI's name and description.
//!
//! Rules are tried in order and the first that both triggers and resolves
//! wins. The last rule always resolves.

use std::sync::LazyLock;

use regex::Regex;

use super::{KpiScalar, KpiValue};
use crate::dataset::{aggregate, count_distinct, Aggregate};
use crate::db::QueryResult;
use crate::plan::KpiSpec;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("pattern is valid"));

const IDENTIFIER_KEYWORDS: &[&str] = &[
    "customer",
    "user",
    "member",
    "account",
    "client",
    "cust",
    "userid",
    "customerid",
];

const MEASURE_KEYWORDS: &[&str] = &[
    "amount",
    "amt",
    "revenue",
    "sales",
    "spend",
    "earning",
    "earned",
    "redeem",
    "redemption",
    "points",
    "point",
    "value",
];

/// A resolved heuristic value.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: KpiScalar,
    pub note: String,
    /// Name used when the KPI itself is unnamed.
    pub default_name: Option<&'static str>,
}

impl Resolution {
    fn new(value: impl Into<KpiScalar>, note: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            note: note.into(),
            default_name: None,
        }
    }
}

/// One entry of the rule table: a trigger over the normalized KPI text and
/// a resolver over the text and dataset. A resolver returning `None` passes
/// to the next rule.
pub struct HeuristicRule {
    pub name: &'static str,
    triggers: &'static [&'static str],
    resolver: fn(&str, &QueryResult) -> Option<Resolution>,
}

impl HeuristicRule {
    /// True when the normalized text contains any trigger. A rule with no
    /// triggers always fires.
    pub fn matches(&self, text: &str) -> bool {
        self.triggers.is_empty() || self.triggers.iter().any(|t| text.contains(t))
    }

    pub fn apply(&self, text: &str, data: &QueryResult) -> Option<Resolution> {
        (self.resolver)(text, data)
    }
}

impl std::fmt::Debug for HeuristicRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeuristicRule")
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .finish()
    }
}

/// The prioritized rule table.
pub static HEURISTIC_RULES: [HeuristicRule; 4] = [
    HeuristicRule {
        name: "count",
        triggers: &["count", "total", "number of", "volume"],
        resolver: resolve_count,
    },
    HeuristicRule {
        name: "active",
        triggers: &["active"],
        resolver: resolve_active,
    },
    HeuristicRule {
        name: "measure",
        triggers: &[
            "revenue",
            "amount",
            "spend",
            "sales",
            "earning",
            "earn",
            "redeem",
            "redemption",
            "points",
        ],
        resolver: resolve_measure,
    },
    HeuristicRule {
        name: "fallback",
        triggers: &[],
        resolver: resolve_fallback,
    },
];

/// Lowercases and collapses every run of non-alphanumerics to one space.
pub fn normalize_text(text: &str) -> String {
    NON_ALNUM
        .replace_all(&text.to_lowercase(), " ")
        .trim()
        .to_string()
}

/// Picks the column whose normalized name best matches `keywords`.
///
/// Scores +3 per keyword contained in the name, +2 when the name equals a
/// keyword, and +1 for numeric columns when `prefer_numeric` is set. Ties go
/// to the earlier column; a zero score never selects.
pub fn pick_best_column(
    data: &QueryResult,
    keywords: &[&str],
    prefer_numeric: bool,
) -> Option<String> {
    let mut best: Option<(u32, &str)> = None;

    for (index, column) in data.columns.iter().enumerate() {
        let normalized = normalize_text(&column.name);
        let mut score = 0;
        for keyword in keywords {
            if normalized.contains(keyword) {
                score += 3;
            }
        }
        if keywords.iter().any(|k| normalized == *k) {
            score += 2;
        }
        if prefer_numeric && data.column_kind(index).is_some_and(|k| k.is_numeric()) {
            score += 1;
        }

        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, column.name.as_str()));
        }
    }

    best.filter(|(score, _)| *score > 0)
        .map(|(_, name)| name.to_string())
}

/// Resolves a KPI through the rule table. Always produces a value.
pub fn resolve(spec: &KpiSpec, data: &QueryResult) -> KpiValue {
    let text = normalize_text(&format!("{} {}", spec.name, spec.description));

    let resolution = HEURISTIC_RULES
        .iter()
        .filter(|rule| rule.matches(&text))
        .find_map(|rule| rule.apply(&text, data))
        .unwrap_or_else(|| fallback(data));

    let name = match resolution.default_name {
        Some(default) if spec.name.is_empty() => default.to_string(),
        _ => spec.name.clone(),
    };
    KpiValue::new(name, resolution.value).with_note(resolution.note)
}

fn row_count(data: &QueryResult) -> KpiScalar {
    KpiScalar::from(data.rows.len())
}

fn distinct_on_identifier(data: &QueryResult) -> Option<(String, KpiScalar)> {
    let column = pick_best_column(data, IDENTIFIER_KEYWORDS, false)?;
    let distinct = count_distinct(data, &column)?;
    Some((column, KpiScalar::from(distinct)))
}

/// True when the text also names a measure, so a count rule without an
/// identifier column should leave the KPI to the measure rule.
fn names_measure(text: &str) -> bool {
    HEURISTIC_RULES[2].matches(text)
}

fn resolve_count(text: &str, data: &QueryResult) -> Option<Resolution> {
    match distinct_on_identifier(data) {
        Some((column, value)) => Some(Resolution::new(
            value,
            format!("heuristic distinct on {column}"),
        )),
        None if names_measure(text) => None,
        None => Some(Resolution::new(row_count(data), "heuristic row count")),
    }
}

fn resolve_active(text: &str, data: &QueryResult) -> Option<Resolution> {
    match distinct_on_identifier(data) {
        Some((column, value)) => Some(Resolution::new(
            value,
            format!("heuristic active distinct on {column}"),
        )),
        None if names_measure(text) => None,
        None => Some(Resolution::new(row_count(data), "heuristic active rows")),
    }
}

fn resolve_measure(_text: &str, data: &QueryResult) -> Option<Resolution> {
    let column = pick_best_column(data, MEASURE_KEYWORDS, true)?;
    let sum = aggregate(data, &column, Aggregate::Sum)?;
    Some(Resolution::new(sum, format!("heuristic sum({column})")))
}

fn resolve_fallback(_text: &str, data: &QueryResult) -> Option<Resolution> {
    Some(fallback(data))
}

fn fallback(data: &QueryResult) -> Resolution {
    Resolution {
        default_name: Some("rows"),
        ..Resolution::new(row_count(data), "fallback rows")
    }
}
