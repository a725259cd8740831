//! SQL fragments that differ between database engines.
//!
//! The dialect is fixed when the database is opened and threaded into the
//! grid query builder. Storage itself is SQLite; the MySQL variant keeps the
//! builder portable.

use serde::{Deserialize, Serialize};

/// Separator used for group-concatenated tag columns.
pub const LIST_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    #[serde(alias = "mariadb")]
    MySql,
}

impl SqlDialect {
    /// Concatenate SQL expressions.
    pub fn concat(&self, parts: &[&str]) -> String {
        match self {
            Self::Sqlite => parts.join(" || "),
            Self::MySql => format!("CONCAT({})", parts.join(", ")),
        }
    }

    /// Aggregate `expr` into a single string joined by `LIST_SEPARATOR`.
    pub fn group_concat(&self, expr: &str) -> String {
        match self {
            Self::Sqlite => format!("GROUP_CONCAT({}, char(31))", expr),
            Self::MySql => format!("GROUP_CONCAT({} SEPARATOR CHAR(31))", expr),
        }
    }

    /// Join non-null expressions with `sep` (a SQL string literal).
    pub fn concat_ws(&self, sep: &str, first: &str, rest: &str) -> String {
        match self {
            Self::Sqlite => format!("{} || COALESCE({} || {}, '')", first, sep, rest),
            Self::MySql => format!("CONCAT_WS({}, {}, {})", sep, first, rest),
        }
    }

    /// Sort key that orders tickets by due date, then start date, with
    /// undated tickets after dated ones.
    pub fn calendar_order(&self, limit_col: &str, start_col: &str) -> String {
        let limit = format!("COALESCE({}, '9999')", limit_col);
        let start = format!("COALESCE({}, '')", start_col);
        self.concat(&[&limit, "'9999'", &start])
    }
}

/// Split a group-concatenated column back into its parts.
pub fn split_list(value: Option<&str>) -> Vec<&str> {
    match value {
        Some(v) if !v.is_empty() => v.split(LIST_SEPARATOR).collect(),
        _ => Vec::new(),
    }
}
