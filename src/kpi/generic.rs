//! Generic KPIs computed for every dataset regardless of plan.

use super::{KpiReport, KpiValue};
use crate::dataset::{
    missing_percentages, numeric_values, quantile, time_span, top_values, Aggregate,
    ColumnClasses,
};
use crate::db::QueryResult;

/// Numeric columns summarized with sum, avg, and p95.
pub const MAX_NUMERIC_SUMMARIES: usize = 6;

/// Columns listed in the missingness risk note.
pub const MISSING_RISK_TOP: usize = 5;

/// Values listed for the first categorical column.
pub const TOP_CATEGORY_VALUES: usize = 5;

const NUMERIC_HIGHLIGHT_COLUMNS: usize = 10;

/// Builds the generic report for one dataset.
pub fn generic_report(dataset_name: &str, data: &QueryResult, classes: &ColumnClasses) -> KpiReport {
    let mut report = KpiReport::new(dataset_name);

    report.kpis.push(KpiValue::new("rows", data.rows.len()));
    report.kpis.push(KpiValue::new("columns", data.columns.len()));

    let missing = missing_percentages(data);
    if missing.first().is_some_and(|(_, pct)| *pct > 0.0) {
        let listed: Vec<String> = missing
            .iter()
            .take(MISSING_RISK_TOP)
            .map(|(column, pct)| format!("{column}:{pct:.1}"))
            .collect();
        report
            .risks
            .push(format!("Top missing columns (%): {}", listed.join(", ")));
    }

    if !classes.numeric.is_empty() {
        for column in classes.numeric.iter().take(MAX_NUMERIC_SUMMARIES) {
            let Some(index) = data.column_index(column) else {
                continue;
            };
            let values = numeric_values(data, index);
            if values.is_empty() {
                continue;
            }
            for agg in [Aggregate::Sum, Aggregate::Avg] {
                if let Some(v) = agg.apply(&values) {
                    report
                        .kpis
                        .push(KpiValue::new(format!("{column}__{}", agg.as_str()), v));
                }
            }
            if let Some(p95) = quantile(&values, 0.95) {
                report.kpis.push(KpiValue::new(format!("{column}__p95"), p95));
            }
        }

        let listed: Vec<&str> = classes
            .numeric
            .iter()
            .take(NUMERIC_HIGHLIGHT_COLUMNS)
            .map(String::as_str)
            .collect();
        report
            .highlights
            .push(format!("Detected numeric columns: {}", listed.join(", ")));
    }

    if let Some(column) = classes.time.first() {
        if let Some((min, max)) = time_span(data, column) {
            report
                .highlights
                .push(format!("Time column `{column}` spans {min} → {max}"));
        }
    }

    if let Some(column) = classes.categorical.first() {
        let top = top_values(data, column, TOP_CATEGORY_VALUES);
        if !top.is_empty() {
            let listed: Vec<String> = top
                .iter()
                .map(|(value, count)| format!("{value}({count})"))
                .collect();
            report
                .highlights
                .push(format!("Top `{column}`: {}", listed.join(", ")));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::classify;
    use crate::db::{ColumnInfo, Value};
    use crate::kpi::KpiScalar;
    use pretty_assertions::assert_eq;

    fn orders() -> QueryResult {
        QueryResult::with_data(
            vec![
                ColumnInfo::new("region", "text"),
                ColumnInfo::new("amount", "int8"),
                ColumnInfo::new("sold_at", "text"),
            ],
            vec![
                vec![Value::from("north"), Value::Int(10), Value::from("2024-01-03")],
                vec![Value::from("south"), Value::Int(20), Value::from("2024-01-01")],
                vec![Value::from("north"), Value::Null, Value::from("2024-01-02")],
                vec![Value::Null, Value::Int(30), Value::from("2024-01-05")],
            ],
        )
    }

    #[test]
    fn test_generic_kpis_in_order() {
        let data = orders();
        let report = generic_report("orders", &data, &classify(&data));

        let names: Vec<&str> = report.kpis.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["rows", "columns", "amount__sum", "amount__avg", "amount__p95"]
        );
        assert_eq!(report.kpi("rows").unwrap().value, KpiScalar::Int(4));
        assert_eq!(report.kpi("columns").unwrap().value, KpiScalar::Int(3));
        assert_eq!(report.kpi("amount__sum").unwrap().value, KpiScalar::Float(60.0));
        assert_eq!(report.kpi("amount__avg").unwrap().value, KpiScalar::Float(20.0));
        assert!(report.kpis.iter().all(|k| k.note.is_none()));
    }

    #[test]
    fn test_generic_highlights_and_risks() {
        let data = orders();
        let report = generic_report("orders", &data, &classify(&data));

        assert_eq!(
            report.highlights,
            vec![
                "Detected numeric columns: amount".to_string(),
                "Time column `sold_at` spans 2024-01-01 00:00:00 → 2024-01-05 00:00:00"
                    .to_string(),
                "Top `region`: north(2), south(1)".to_string(),
            ]
        );
        assert_eq!(
            report.risks,
            vec!["Top missing columns (%): region:25.0, amount:25.0, sold_at:0.0".to_string()]
        );
    }

    #[test]
    fn test_no_missing_risk_when_complete() {
        let data = QueryResult::with_data(
            vec![ColumnInfo::new("n", "int4")],
            vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        );
        let report = generic_report("complete", &data, &classify(&data));
        assert!(report.risks.is_empty());
    }

    #[test]
    fn test_numeric_summaries_capped() {
        let columns: Vec<ColumnInfo> = (0..8)
            .map(|i| ColumnInfo::new(format!("m{i}"), "int4"))
            .collect();
        let row: Vec<Value> = (0..8).map(Value::Int).collect();
        let data = QueryResult::with_data(columns, vec![row]);
        let report = generic_report("wide", &data, &classify(&data));

        // rows + columns + 6 columns * 3 summaries
        assert_eq!(report.kpis.len(), 2 + MAX_NUMERIC_SUMMARIES * 3);
        assert!(report.kpi("m6__sum").is_none());
        assert_eq!(
            report.highlights[0],
            "Detected numeric columns: m0, m1, m2, m3, m4, m5, m6, m7"
        );
    }

    #[test]
    fn test_empty_dataset() {
        let data = QueryResult::with_data(vec![ColumnInfo::new("a", "int4")], vec![]);
        let report = generic_report("empty", &data, &classify(&data));
        assert_eq!(report.kpis.len(), 2);
        assert!(report.highlights.is_empty());
        assert!(report.risks.is_empty());
    }
}
