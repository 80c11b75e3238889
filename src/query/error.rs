//! Query error types
//!
//! Defines all error conditions that can occur while rewriting and running
//! dashboard queries.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// A time macro named a format that is neither a keyword nor a valid
    /// date pattern
    #[error("Unrecognized date format in time macro: '{format}'")]
    UnrecognizedFormat { format: String },

    /// The backend answered with an error descriptor
    #[error("{0}")]
    Backend(String),

    /// The request itself is unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
