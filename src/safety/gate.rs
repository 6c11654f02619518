//! Allow/deny matching for the read-only gate.

use std::sync::LazyLock;

use regex::Regex;

use super::{Rejection, RejectionReason};

/// Keywords that make a statement unsafe wherever they appear as a whole word.
pub const FORBIDDEN_KEYWORDS: [&str; 12] = [
    "INSERT", "UPDATE", "DELETE", "MERGE", "DROP", "ALTER", "TRUNCATE", "CREATE", "GRANT",
    "REVOKE", "EXEC", "EXECUTE",
];

/// `SELECT`, optionally preceded by one or more `name AS (...)` CTEs.
///
/// The CTE body is matched lazily up to a closing paren followed by the next
/// CTE or by `SELECT`, so nested parens inside a body are tolerated.
static SELECT_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    let name = r#"(?:[a-z_][a-z0-9_]*|"[^"]+")"#;
    let cte = format!(r"{name}\s*(?:\([^)]*\)\s*)?AS\s*\(.+?\)\s*");
    let pattern = format!(r"(?is)^(?:WITH\s+(?:RECURSIVE\s+)?{cte}(?:,\s*{cte})*)?SELECT\b");
    Regex::new(&pattern).expect("select shape pattern is valid")
});

static FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b(?:{})\b", FORBIDDEN_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("forbidden keyword pattern is valid")
});

/// Strips surrounding whitespace and statement terminators.
pub fn normalize(sql: &str) -> &str {
    sql.trim_matches(|c: char| c == ';' || c.is_whitespace())
}

/// Fails unless `sql` is a single SELECT-shaped statement free of forbidden keywords.
pub fn check(sql: &str) -> Result<(), Rejection> {
    let statement = normalize(sql);

    if statement.is_empty() {
        return Err(Rejection::new(RejectionReason::Empty, sql));
    }

    if let Some(found) = FORBIDDEN.find(statement) {
        return Err(Rejection::new(
            RejectionReason::ForbiddenKeyword(found.as_str().to_uppercase()),
            sql,
        ));
    }

    if !SELECT_SHAPE.is_match(statement) {
        return Err(Rejection::new(RejectionReason::NotSelect, sql));
    }

    Ok(())
}

/// Convenience predicate over [`check`].
pub fn is_select_only(sql: &str) -> bool {
    check(sql).is_ok()
}
