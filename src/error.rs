// src/error.rs
//! Error types for every stage of the timetable pipeline.
//!
//! Each stage has its own vocabulary (`FetchError`, `ParseError`,
//! `ValidationError`); [`QueryError`] is the single typed error a caller of
//! the query facade ever sees. All of them are `Clone` because one in-flight
//! result is handed to every waiter on the same cache key.

use crate::types::{Identifier, ValidationError};
use thiserror::Error;

/// Failure to retrieve a page from the source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request did not complete within the configured timeout.
    #[error("Request for {url} timed out")]
    Timeout { url: String },

    /// The page does not exist or the identifier cannot be mapped to a page.
    #[error("No timetable page for {identifier}: {reason}")]
    NotFound { identifier: String, reason: String },

    /// A failure worth retrying: 5xx, connection reset, truncated body.
    #[error("Transient failure: {reason}")]
    Transient { reason: String },
}

impl FetchError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classifies a transport-level reqwest error.
    pub fn from_transport(url: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
            }
        } else {
            Self::Transient {
                reason: format!("{}: {}", url, err),
            }
        }
    }
}

/// Failure to read a timetable out of page markup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No table with the expected layout exists on the page at all.
    #[error("Timetable structure not found on page for {identifier}: {reason}")]
    StructureNotFound { identifier: String, reason: String },

    /// The table was found but one cell could not be read. Reported as a
    /// warning alongside a partial grid, never as a hard failure.
    #[error("Malformed cell at row {row}, column {column}: {reason}")]
    CellMalformed {
        row: usize,
        column: usize,
        reason: String,
    },
}

/// The typed error surfaced to callers of the query facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Not found: {identifier} ({reason})")]
    NotFound { identifier: String, reason: String },

    #[error("Timed out fetching {url}")]
    Timeout { url: String },

    #[error("Source unavailable after retries: {reason}")]
    Unavailable { reason: String },

    #[error("Parse failure: {0}")]
    ParseFailure(#[from] ParseError),

    #[error("Validation failure: {0}")]
    ValidationFailure(#[from] ValidationError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl From<FetchError> for QueryError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Timeout { url } => QueryError::Timeout { url },
            FetchError::NotFound { identifier, reason } => {
                QueryError::NotFound { identifier, reason }
            }
            FetchError::Transient { reason } => QueryError::Unavailable { reason },
        }
    }
}

impl QueryError {
    pub fn not_found(identifier: &Identifier, reason: impl Into<String>) -> Self {
        QueryError::NotFound {
            identifier: identifier.to_string(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable name, used by the CLI's JSON error output.
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::NotFound { .. } => "not_found",
            QueryError::Timeout { .. } => "timeout",
            QueryError::Unavailable { .. } => "unavailable",
            QueryError::ParseFailure(_) => "parse_failure",
            QueryError::ValidationFailure(_) => "validation_failure",
            QueryError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T, E = QueryError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(FetchError::Timeout { url: "u".into() }.is_retryable());
        assert!(FetchError::Transient { reason: "503".into() }.is_retryable());
        let missing = FetchError::NotFound {
            identifier: "class:999".into(),
            reason: "404".into(),
        };
        assert!(!missing.is_retryable());
        assert!(missing.is_not_found());
    }

    #[test]
    fn fetch_errors_map_to_query_errors() {
        let err: QueryError = FetchError::Timeout { url: "u".into() }.into();
        assert_eq!(err.code(), "timeout");
        let err: QueryError = FetchError::Transient { reason: "reset".into() }.into();
        assert_eq!(err.code(), "unavailable");
        let err: QueryError = ValidationError::InvalidConfig("x".into()).into();
        assert_eq!(err.code(), "validation_failure");
    }

    #[test]
    fn error_messages() {
        let err = ParseError::StructureNotFound {
            identifier: "class:101".into(),
            reason: "no period rows".into(),
        };
        assert_eq!(
            err.to_string(),
            "Timetable structure not found on page for class:101: no period rows"
        );
    }
}
