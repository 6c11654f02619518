//! Read-only query gate.
//!
//! Every statement sent to the upstream source passes through [`check`] first.
//! The gate is a textual allow/deny filter, not a parser: it accepts only
//! statements shaped like `SELECT ...` or `WITH name AS (...) SELECT ...` and
//! rejects any text containing a data- or schema-modifying keyword as a whole
//! word, including keywords inside string literals or comments.

mod gate;

pub use gate::{check, is_select_only, normalize, FORBIDDEN_KEYWORDS};

use std::fmt;

/// Maximum number of SQL characters quoted in a rejection.
pub const EXCERPT_CHARS: usize = 200;

/// Why a statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Nothing left after trimming whitespace and terminators.
    Empty,
    /// The statement does not start with `SELECT` or a `WITH ... SELECT` prefix.
    NotSelect,
    /// A forbidden keyword appears as a whole word (uppercased).
    ForbiddenKeyword(String),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty statement"),
            Self::NotSelect => write!(f, "statement is not a SELECT query"),
            Self::ForbiddenKeyword(word) => write!(f, "forbidden keyword {word}"),
        }
    }
}

/// A statement the gate refused to let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: RejectionReason,
    /// Leading part of the offending SQL, for diagnostics.
    pub excerpt: String,
}

impl Rejection {
    pub(crate) fn new(reason: RejectionReason, sql: &str) -> Self {
        Self {
            reason,
            excerpt: excerpt(sql),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "only read-only SELECT queries are allowed ({}): {}",
            self.reason, self.excerpt
        )
    }
}

impl std::error::Error for Rejection {}

/// Collapses whitespace and truncates to [`EXCERPT_CHARS`] characters.
fn excerpt(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut out: String = flat.chars().take(EXCERPT_CHARS).collect();
    out.push('…');
    out
}
