//! Quote escaping for SQL interpolation.
//!
//! This is quote-escaping, not full sanitization: backslashes, semicolons and
//! everything else pass through unchanged, because escaped output is always
//! placed inside the matching quote style by the query builder.

/// Escape a column or table name for use inside double quotes.
pub fn escape_identifier(name: &str) -> String {
    name.replace('"', "\"\"")
}

/// Escape a literal value for use inside single quotes.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("level"), "level");
        assert_eq!(escape_identifier("a\"b"), "a\"\"b");
        assert_eq!(escape_identifier("\"\""), "\"\"\"\"");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("it's"), "it''s");
        assert_eq!(escape_literal("O'Brien"), "O''Brien");
        assert_eq!(escape_literal("plain"), "plain");
    }

    #[test]
    fn test_only_quotes_are_touched() {
        assert_eq!(escape_literal("a\\b;c"), "a\\b;c");
        assert_eq!(escape_identifier("a\\b;c"), "a\\b;c");
    }
}
