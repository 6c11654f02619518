//! Dataset semantics: column classification and column statistics.
//!
//! Both operate on the same [`QueryResult`](crate::db::QueryResult) that the
//! upstream clients return and the cache reloads.

mod infer;
mod stats;

pub use infer::{classify, ColumnClass, ColumnClasses, TIME_PARSE_THRESHOLD};
pub use stats::{
    aggregate, count_distinct, missing_percentages, numeric_values, quantile, time_span,
    top_values, Aggregate,
};
