//! Caller-facing error types.
//!
//! Internal plumbing returns `anyhow::Result`; these enums exist where a caller
//! must tell "you asked for something invalid" apart from "the backend failed".

use thiserror::Error;

/// Input rejected before any I/O happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("limit must be a positive integer (got {0})")]
    InvalidLimit(i64),
    #[error("memory content must not be empty")]
    EmptyContent,
    #[error("invalid {kind}: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("search backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Identifiers (thread, chunk, memory ids) end up in file paths and SQL
/// parameters; keep them printable, bounded and free of path separators.
pub fn validate_identifier(kind: &'static str, value: &str) -> Result<(), ValidationError> {
    let ok = !value.is_empty()
        && value.len() <= 256
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\', '\0'])
        && !value.chars().any(char::is_control);
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("thread id", "telegram:12345").is_ok());
        assert!(validate_identifier("thread id", "").is_err());
        assert!(validate_identifier("thread id", "..").is_err());
        assert!(validate_identifier("chunk id", "a/b").is_err());
        assert!(validate_identifier("chunk id", &"x".repeat(300)).is_err());
    }

    #[test]
    fn test_validation_converts_into_search_error() {
        let err: SearchError = ValidationError::EmptyQuery.into();
        assert!(matches!(err, SearchError::Validation(ValidationError::EmptyQuery)));
        assert_eq!(err.to_string(), "query must not be empty");
    }
}
