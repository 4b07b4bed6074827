//! WHERE clause composition and custom SQL validation.

use crate::error::EngineError;
use crate::escape::{escape_identifier, escape_literal};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row cap appended to custom SQL that carries no LIMIT of its own.
pub const MAX_ROWS: usize = 5000;

/// Column name prefixes excluded from free-text search (housekeeping columns).
const INTERNAL_COLUMN_PREFIXES: &[&str] = &["_"];

/// The closed set of filter operators accepted from the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOperator {
    Eq,
    Ne,
    Like,
    ILike,
    Gt,
    Lt,
    Ge,
    Le,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Parse the SQL spelling of an operator, rejecting anything outside
    /// the allowed set.
    pub fn parse(op: &str) -> Result<Self, EngineError> {
        match op.trim().to_uppercase().as_str() {
            "=" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            "LIKE" => Ok(Self::Like),
            "ILIKE" => Ok(Self::ILike),
            ">" => Ok(Self::Gt),
            "<" => Ok(Self::Lt),
            ">=" => Ok(Self::Ge),
            "<=" => Ok(Self::Le),
            "IS NULL" => Ok(Self::IsNull),
            "IS NOT NULL" => Ok(Self::IsNotNull),
            other => Err(EngineError::InvalidOperator(other.to_string())),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Null checks take no right-hand value.
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsNull | Self::IsNotNull)
    }

    fn wraps_wildcards(&self) -> bool {
        matches!(self, Self::Like | Self::ILike)
    }
}

/// A single validated filter condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterClause {
    /// Validate and build a clause. The raw operator string is checked
    /// against the allowed set; the value is ignored for null checks.
    pub fn new(column: &str, operator: &str, value: &str) -> Result<Self, EngineError> {
        let operator = FilterOperator::parse(operator)?;
        Ok(Self {
            column: column.to_string(),
            operator,
            value: if operator.is_unary() {
                String::new()
            } else {
                value.to_string()
            },
        })
    }

    /// SQL fragment with the identifier double-quoted and the value
    /// escaped inside single quotes. Raw value text never reaches the
    /// SQL string unescaped.
    pub fn to_sql(&self) -> String {
        let column = escape_identifier(&self.column);
        if self.operator.is_unary() {
            return format!("\"{}\" {}", column, self.operator.as_sql());
        }
        let value = escape_literal(&self.value);
        if self.operator.wraps_wildcards() {
            format!("\"{}\" {} '%{}%'", column, self.operator.as_sql(), value)
        } else {
            format!("\"{}\" {} '{}'", column, self.operator.as_sql(), value)
        }
    }
}

impl fmt::Display for FilterClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.operator.is_unary() {
            write!(f, "{} {}", self.column, self.operator.as_sql())
        } else {
            write!(f, "{} {} {}", self.column, self.operator.as_sql(), self.value)
        }
    }
}

fn is_searchable(column: &str) -> bool {
    !INTERNAL_COLUMN_PREFIXES
        .iter()
        .any(|prefix| column.starts_with(prefix))
}

/// Compose the WHERE clause for the current filters and search text.
///
/// Filters are AND-joined. A non-blank search term becomes a parenthesized
/// OR across the searchable columns, each cast to text and matched with
/// ILIKE. Returns `Ok(None)` when there is nothing to filter on.
///
/// When search is requested but no searchable columns exist yet (schema not
/// loaded), this returns `EngineError::SearchUnavailable` so callers surface
/// the condition instead of silently dropping the search term.
pub fn build_where_clause(
    filters: &[FilterClause],
    search_text: &str,
    columns: &[String],
) -> Result<Option<String>, EngineError> {
    let mut parts: Vec<String> = filters.iter().map(FilterClause::to_sql).collect();

    let search = search_text.trim();
    if !search.is_empty() {
        let searchable: Vec<&String> = columns
            .iter()
            .filter(|c| is_searchable(c.as_str()))
            .collect();
        if searchable.is_empty() {
            return Err(EngineError::SearchUnavailable);
        }
        let needle = escape_literal(search);
        let disjuncts: Vec<String> = searchable
            .iter()
            .map(|col| format!("\"{}\"::text ILIKE '%{}%'", escape_identifier(col), needle))
            .collect();
        parts.push(format!("({})", disjuncts.join(" OR ")));
    }

    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(" AND ")))
    }
}

/// Validate a custom SQL override: SELECT statements only, with a row cap
/// appended when the text carries no LIMIT.
///
/// LIMIT detection is a plain case-insensitive substring search, so a column
/// named e.g. `rate_limit` suppresses the appended cap.
pub fn validate_custom_sql(sql: &str) -> Result<String, EngineError> {
    let trimmed = sql.trim();
    if !trimmed.to_uppercase().starts_with("SELECT") {
        return Err(EngineError::NotSelect);
    }
    if trimmed.to_uppercase().contains("LIMIT") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{} LIMIT {}", trimmed, MAX_ROWS))
    }
}
