//! Frame materialization error types

use crate::client::ApiError;
use thiserror::Error;

/// Errors raised while building or exporting frames
#[derive(Error, Debug)]
pub enum FrameError {
    /// Fetching events failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// An event timestamp could not be parsed
    #[error("Invalid timestamp: {0}")]
    Timestamp(String),

    /// Resampling frequency must be positive
    #[error("Invalid frequency: must be longer than zero")]
    InvalidFrequency,

    /// Sliding windows need a positive `lookback + horizon`
    #[error("Invalid window: lookback + horizon must be longer than zero")]
    InvalidWindow,

    /// Frames cannot be stacked because their shapes differ
    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A cell could not be converted to a number
    #[error("Non-numeric value in column {column}")]
    NonNumeric { column: String },

    /// A requested column does not exist
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for frame operations
pub type FrameResult<T> = Result<T, FrameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FrameError::ShapeMismatch {
            expected: (6, 2),
            found: (5, 2),
        };
        assert_eq!(err.to_string(), "Shape mismatch: expected (6, 2), found (5, 2)");

        let err = FrameError::from(ApiError::Authentication);
        assert_eq!(err.to_string(), "Authentication failed: invalid auth key");
    }
}
