//! Error types for Matrixon
//!
//! This module defines the error types shared by the timeline store, the
//! sync writer and the replay tooling. Storage inconsistencies are fatal to
//! the write that observed them; callers abort the enclosing transaction and
//! decide themselves whether to retry the sync cycle.

use std::io;

use thiserror::Error;

/// Matrixon error types
#[derive(Debug, Error)]
pub enum MatrixonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage engine or record encoding failure
    #[error("Database error: {0}")]
    Database(String),

    /// Input did not pass validation (bad identifiers, bad arguments)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Stored state contradicts what the caller expects, e.g. a live
    /// fragment that should exist but does not.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl MatrixonError {
    pub fn bad_database(msg: impl Into<String>) -> Self {
        MatrixonError::Database(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        MatrixonError::InvalidState(msg.into())
    }
}

/// Result type for Matrixon operations
pub type Result<T> = std::result::Result<T, MatrixonError>;

impl From<serde_json::Error> for MatrixonError {
    fn from(err: serde_json::Error) -> Self {
        MatrixonError::Serialization(err.to_string())
    }
}

impl From<ruma::IdParseError> for MatrixonError {
    fn from(err: ruma::IdParseError) -> Self {
        MatrixonError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_error_display() {
        let err = MatrixonError::Config("test".to_string());
        assert_eq!(err.to_string(), "Configuration error: test");

        let err = MatrixonError::bad_database("test");
        assert_eq!(err.to_string(), "Database error: test");

        let err = MatrixonError::invalid_state("old live fragment missing");
        assert_eq!(err.to_string(), "Invalid state: old live fragment missing");

        let err = MatrixonError::AlreadyExists("$event".to_string());
        assert_eq!(err.to_string(), "Resource already exists: $event");
    }

    #[test]
    fn test_error_conversion_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "test");
        let err: MatrixonError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_conversion_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: MatrixonError = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }

    #[test]
    fn test_error_conversion_from_id_parse() {
        let parse_err = <&ruma::RoomId>::try_from("not-a-room").unwrap_err();
        let err: MatrixonError = parse_err.into();
        assert!(matches!(err, MatrixonError::Validation(_)));
    }
}
