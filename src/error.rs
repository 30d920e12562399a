//! Error types for the query path.
//!
//! Every failure here is a caller input problem or a fail-closed index
//! condition; none of them are retried.

use serde::Serialize;
use thiserror::Error;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The request body could not be parsed at all.
    #[error("Malformed request: {0}")]
    MalformedInput(String),

    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// The cursor token is not a token this server produced.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// The cursor decodes but belongs to a different query shape.
    #[error("Stale cursor: {0}")]
    StaleCursor(String),

    #[error("Filter {field} has {count} distinct values, maximum is {max}")]
    CapacityExceeded {
        field: String,
        count: usize,
        max: usize,
    },

    #[error("Search cancelled")]
    Cancelled,

    #[error("Index inconsistent: {0}")]
    IndexInconsistent(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// HTTP-style status code a transport layer should use.
    pub fn status(&self) -> u16 {
        match self {
            SearchError::MalformedInput(_) | SearchError::Validation(_) => 422,
            SearchError::InvalidCursor(_)
            | SearchError::StaleCursor(_)
            | SearchError::CapacityExceeded { .. } => 400,
            SearchError::Cancelled => 499,
            SearchError::IndexInconsistent(_) | SearchError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::MalformedInput(_) => "MALFORMED_INPUT",
            SearchError::Validation(_) => "VALIDATION_FAILED",
            SearchError::InvalidCursor(_) => "INVALID_CURSOR",
            SearchError::StaleCursor(_) => "STALE_CURSOR",
            SearchError::CapacityExceeded { .. } => "BAD_REQUEST",
            SearchError::Cancelled => "CANCELLED",
            SearchError::IndexInconsistent(_) | SearchError::Internal(_) => "INTERNAL",
        }
    }

    pub fn details(&self) -> Vec<FieldError> {
        match self {
            SearchError::Validation(errors) => errors.clone(),
            SearchError::MalformedInput(reason) => vec![FieldError::new("body", reason.clone())],
            SearchError::InvalidCursor(reason) | SearchError::StaleCursor(reason) => {
                vec![FieldError::new("cursor", reason.clone())]
            }
            SearchError::CapacityExceeded { field, count, max } => vec![FieldError::new(
                field.clone(),
                format!("{} distinct values exceeds the maximum of {}", count, max),
            )],
            _ => Vec::new(),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            status: self.status(),
            code: self.code(),
            message: self.to_string(),
            details: self.details(),
        }
    }
}

/// Serializable error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

pub type SearchResult<T> = std::result::Result<T, SearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SearchError::InvalidCursor("x".into()).status(), 400);
        assert_eq!(SearchError::StaleCursor("x".into()).status(), 400);
        assert_eq!(SearchError::MalformedInput("x".into()).status(), 422);
        assert_eq!(SearchError::Validation(vec![]).status(), 422);
        let capacity = SearchError::CapacityExceeded {
            field: "filters.tags".into(),
            count: 101,
            max: 100,
        };
        assert_eq!(capacity.status(), 400);
        assert_eq!(capacity.code(), "BAD_REQUEST");
    }

    #[test]
    fn test_cursor_errors_have_distinct_codes() {
        let invalid = SearchError::InvalidCursor("bad base64".into());
        let stale = SearchError::StaleCursor("fingerprint mismatch".into());
        assert_ne!(invalid.code(), stale.code());
    }

    #[test]
    fn test_error_body_lists_details() {
        let err = SearchError::Validation(vec![
            FieldError::new("filters.date.from", "not an ISO-8601 date"),
            FieldError::new("sort.dir", "expected asc or desc"),
        ]);
        let body = err.to_body();
        assert_eq!(body.status, 422);
        assert_eq!(body.details.len(), 2);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["details"][0]["field"], "filters.date.from");
    }
}
