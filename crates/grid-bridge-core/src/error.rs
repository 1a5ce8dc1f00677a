//! Error types for grid-bridge-core

use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while addressing or encoding cell data
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed column or row token
    #[error("Invalid cell address: {0}")]
    InvalidAddress(String),

    /// Malformed range or anchor
    #[error("Invalid cell range: {0}")]
    InvalidRange(String),

    /// A value that has no wire representation
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Table columns of different lengths
    #[error("Table column '{column}' has {actual} values, expected {expected}")]
    RaggedTable {
        column: String,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Create an invalid-address error with a message
    pub fn address<S: Into<String>>(msg: S) -> Self {
        Error::InvalidAddress(msg.into())
    }
}
