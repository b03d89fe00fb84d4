//! Error types for secgraph-core

use thiserror::Error;

/// Errors that can occur while routing and executing questions
#[derive(Error, Debug)]
pub enum QueryError {
    /// Graph store unreachable or unusable
    #[error("Graph store error: {0}")]
    Connection(String),

    /// Spatial lookup could not resolve a place name
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    /// Caller-supplied value out of contract
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Model call failed or produced unusable output
    #[error("Query generation failed: {0}")]
    Generation(String),

    /// No direct pattern matched and the generative fallback was disabled
    #[error("Question does not match any known pattern and generative fallback is disabled")]
    Unroutable,
}

impl From<neo4rs::Error> for QueryError {
    fn from(err: neo4rs::Error) -> Self {
        QueryError::Connection(err.to_string())
    }
}

/// Result type for secgraph-core operations
pub type Result<T> = std::result::Result<T, QueryError>;
