//! Query service error types
//!
//! Maps transport failures onto the cases callers act on: bad credentials
//! and missing resources are terminal, service hiccups may be retried.

use std::fmt;
use thiserror::Error;

/// What a not-found response refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Event,
    Stream,
    Field,
    Query,
}

impl NotFoundKind {
    /// Infer the missing resource from the request path
    pub fn from_path(path: &str) -> Self {
        if path.contains("/events/") {
            Self::Event
        } else if path.contains("/fields") || path.contains("/stats/") {
            Self::Field
        } else if path.contains("/query") {
            Self::Query
        } else {
            Self::Stream
        }
    }
}

impl fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Event => "Event",
            Self::Stream => "Stream",
            Self::Field => "Field",
            Self::Query => "Query",
        };
        write!(f, "{}", s)
    }
}

/// Errors returned by the query service client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Rejected credentials
    #[error("Authentication failed: invalid auth key")]
    Authentication,

    /// Resource absent at the requested path
    #[error("{kind} not found: {path}")]
    NotFound { kind: NotFoundKind, path: String },

    /// Any other unsuccessful status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Connection failure or timeout
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// An event slice kept failing past the retry bound
    #[error("Failed to get cursor after {attempts} attempts")]
    PaginationExhausted { attempts: u32 },

    /// A required response header was absent
    #[error("Missing `{0}` header in response")]
    MissingHeader(&'static str),
}

impl ApiError {
    /// Classify an unsuccessful HTTP status
    pub fn from_status(status: u16, path: &str, message: String) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            404 => Self::NotFound {
                kind: NotFoundKind::from_path(path),
                path: path.to_string(),
            },
            _ => Self::Api { status, message },
        }
    }

    /// Check whether a page fetch that failed this way may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Request(_))
    }
}

/// Result type alias for client operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(matches!(
            ApiError::from_status(401, "/query", String::new()),
            ApiError::Authentication
        ));
        assert!(matches!(
            ApiError::from_status(403, "/query", String::new()),
            ApiError::Authentication
        ));

        let err = ApiError::from_status(404, "/streams/weather/events/abc", String::new());
        assert_eq!(err.to_string(), "Event not found: /streams/weather/events/abc");
        let err = ApiError::from_status(404, "/streams/weather", String::new());
        assert_eq!(err.to_string(), "Stream not found: /streams/weather");
        let err = ApiError::from_status(404, "/streams/weather/fields", String::new());
        assert!(err.to_string().starts_with("Field not found"));

        let err = ApiError::from_status(503, "/query/q1/events", "busy".to_string());
        assert_eq!(err.to_string(), "API error 503: busy");
    }

    #[test]
    fn test_retryable() {
        assert!(ApiError::from_status(500, "/query", String::new()).is_retryable());
        assert!(!ApiError::Authentication.is_retryable());
        assert!(!ApiError::Malformed("bad".to_string()).is_retryable());
        assert!(!ApiError::from_status(404, "/query/x", String::new()).is_retryable());
        assert!(!ApiError::PaginationExhausted { attempts: 4 }.is_retryable());
    }
}
