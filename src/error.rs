//! Error types for snapshot sources.

use jvmwatch_types::AttributeError;
use thiserror::Error;

/// Errors raised while talking to a snapshot source.
///
/// Any of these aborts the current poll tick; the published snapshot is
/// marked disconnected and carries the rendered message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// Could not reach the target at all.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The source rejected or failed a query.
    #[error("Query '{object}' failed: {message}")]
    Query { object: String, message: String },

    /// An expected attribute was missing or had the wrong shape.
    #[error("Unexpected data from '{object}': {source}")]
    Attribute {
        object: String,
        #[source]
        source: AttributeError,
    },

    /// The query did not complete within the configured timeout.
    #[error("Query '{0}' timed out")]
    Timeout(String),

    /// The source has been closed.
    #[error("Source closed")]
    Closed,
}

impl SourceError {
    pub fn query(object: &str, message: impl Into<String>) -> Self {
        SourceError::Query {
            object: object.to_string(),
            message: message.into(),
        }
    }

    pub fn attribute(object: &str, source: AttributeError) -> Self {
        SourceError::Attribute {
            object: object.to_string(),
            source,
        }
    }
}
