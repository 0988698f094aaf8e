//! Error types for the document engine
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for document-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the document engine
#[derive(Debug, Error)]
pub enum Error {
    /// Data corruption detected while decoding keys or values
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Caller passed an argument the operation cannot accept
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed or internally inconsistent command request
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The engine reached a state an operation cannot proceed from
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// A list index referred to a position outside the current list.
    ///
    /// This is a recoverable usage error: the statement fails, not the
    /// whole write batch.
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(String),

    /// Command recognized but not implemented by this engine
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for errors a caller can report per-statement and continue from.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::IndexOutOfBounds(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_corruption() {
        let err = Error::Corruption("bad value tag 0xff".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Data corruption"));
        assert!(msg.contains("0xff"));
    }

    #[test]
    fn test_error_display_invalid_command() {
        let err = Error::InvalidCommand("no value provided".to_string());
        assert!(err.to_string().contains("Invalid command"));
    }

    #[test]
    fn test_index_out_of_bounds_is_usage_error() {
        let err = Error::IndexOutOfBounds("index 7 in list of 3".to_string());
        assert!(err.is_usage_error());
        assert!(!Error::IllegalState("x".into()).is_usage_error());
    }
}
