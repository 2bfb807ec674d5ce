/// simpledb Error Module
///
/// This module defines the error taxonomy for the database access layer.
/// Every failure is surfaced synchronously to the caller as exactly one
/// variant; nothing in this crate retries or rolls back on its own.
use thiserror::Error;

/// Error type for all simpledb operations.
///
/// The variants follow the layers a statement passes through:
/// - opening and holding a connection
/// - preparing, binding and executing a statement
/// - coercing a result column into a record field
/// - moving a context through its transaction states
/// - loading configuration
#[derive(Error, Debug)]
pub enum DbError {
    /// A connection could not be opened, configured or closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement preparation, binding or execution failed in the backend
    #[error("Statement error: {0}")]
    Statement(#[from] rusqlite::Error),

    /// A matched column could not be coerced into the destination type
    #[error("Mapping error on column '{column}': {message}")]
    Mapping { column: String, message: String },

    /// Invalid transaction transition for the calling context
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Create a mapping error for a specific column
    pub fn mapping(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a connection error, keeping the driver's message
    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    /// Check if this is a mapping error
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// Check if this error came from statement execution
    pub fn is_statement(&self) -> bool {
        matches!(self, Self::Statement(_))
    }
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
