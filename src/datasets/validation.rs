//! Validation utilities for SQL identifiers taken from configuration.
//!
//! Table and procedure names are interpolated into SQL text (they cannot be
//! bound as parameters), so every name that comes from configuration is
//! checked here at startup. Column names coming from uploaded files are never
//! validated, only quoted with [`quote_identifier`].

use std::collections::HashSet;
use std::sync::LazyLock;

/// Maximum length for an identifier. PostgreSQL truncates at 63 bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// SQL reserved words that cannot be used as identifiers.
static RESERVED_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "select", "from", "where", "insert", "update", "delete", "create", "drop", "alter",
        "table", "index", "view", "and", "or", "not", "null", "true", "false", "in", "is", "like",
        "between", "join", "on", "as", "order", "by", "group", "having", "limit", "offset",
        "union", "all", "distinct", "case", "when", "then", "else", "end", "exists", "any", "some",
        "function", "procedure", "returning",
    ]
    .into_iter()
    .collect()
});

/// Error type for identifier validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    Empty,
    TooLong(usize),
    InvalidFirstChar(char),
    InvalidChar(char),
    ReservedWord(String),
}

impl std::fmt::Display for IdentifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "identifier cannot be empty"),
            Self::TooLong(len) => write!(
                f,
                "identifier exceeds maximum length of {} (got {})",
                MAX_IDENTIFIER_LENGTH, len
            ),
            Self::InvalidFirstChar(c) => write!(
                f,
                "identifier must start with a letter or underscore, got '{}'",
                c
            ),
            Self::InvalidChar(c) => {
                write!(f, "identifier contains invalid character '{}'", c)
            }
            Self::ReservedWord(word) => write!(
                f,
                "'{}' is a SQL reserved word and cannot be used as an identifier",
                word
            ),
        }
    }
}

impl std::error::Error for IdentifierError {}

/// Validate a table or procedure name.
///
/// A valid identifier must:
/// - Not be empty
/// - Not exceed 63 characters
/// - Start with a letter or underscore
/// - Contain only ASCII alphanumeric characters and underscores
/// - Not be a SQL reserved word
///
/// Case is preserved; `AUDIT_MASTER` and `raw_airports` are both valid.
pub fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong(name.len()));
    }

    let mut chars = name.chars();

    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return Err(IdentifierError::InvalidFirstChar(first));
        }
    }

    for c in chars {
        if !c.is_ascii_alphanumeric() && c != '_' {
            return Err(IdentifierError::InvalidChar(c));
        }
    }

    let lower = name.to_lowercase();
    if RESERVED_WORDS.contains(lower.as_str()) {
        return Err(IdentifierError::ReservedWord(name.to_string()));
    }

    Ok(())
}

/// Quote an identifier for interpolation into PostgreSQL text.
///
/// Embedded double quotes are doubled, so arbitrary header names from an
/// uploaded file cannot escape the quoted identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Valid identifiers ===

    #[test]
    fn test_valid_raw_table() {
        assert!(validate_identifier("raw_airports").is_ok());
    }

    #[test]
    fn test_valid_uppercase_audit_table() {
        assert!(validate_identifier("AUDIT_MASTER").is_ok());
    }

    #[test]
    fn test_valid_procedure_name() {
        assert!(validate_identifier("sp_clean_airlines").is_ok());
    }

    #[test]
    fn test_valid_underscore_prefix() {
        assert!(validate_identifier("_staging").is_ok());
    }

    // === Invalid ===

    #[test]
    fn test_invalid_empty() {
        assert!(matches!(
            validate_identifier(""),
            Err(IdentifierError::Empty)
        ));
    }

    #[test]
    fn test_invalid_starts_with_number() {
        assert!(matches!(
            validate_identifier("1sp"),
            Err(IdentifierError::InvalidFirstChar('1'))
        ));
    }

    #[test]
    fn test_invalid_statement_injection() {
        assert!(matches!(
            validate_identifier("sp_clean; drop table x"),
            Err(IdentifierError::InvalidChar(';'))
        ));
    }

    #[test]
    fn test_invalid_schema_qualified() {
        assert!(matches!(
            validate_identifier("public.raw_sales"),
            Err(IdentifierError::InvalidChar('.'))
        ));
    }

    #[test]
    fn test_invalid_reserved_word() {
        assert!(matches!(
            validate_identifier("SELECT"),
            Err(IdentifierError::ReservedWord(_))
        ));
    }

    #[test]
    fn test_invalid_too_long() {
        let long_name = "a".repeat(64);
        assert!(matches!(
            validate_identifier(&long_name),
            Err(IdentifierError::TooLong(64))
        ));
    }

    #[test]
    fn test_valid_max_length() {
        assert!(validate_identifier(&"a".repeat(63)).is_ok());
    }

    // === Quoting ===

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote_identifier("AirportKey"), "\"AirportKey\"");
    }

    #[test]
    fn test_quote_escapes_embedded_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
