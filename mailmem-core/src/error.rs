//! Error types for the mailmem core library.

use thiserror::Error;

/// Top-level error type for all memory operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Vector search was requested from a store that has no embedding provider.
    #[error("Store is not vector-indexed; cannot search namespace {namespace}")]
    NotIndexed {
        /// Namespace the search targeted.
        namespace: String,
    },

    /// A namespace was empty or contained an empty segment.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// A stored record does not have the shape its reader expects.
    #[error("Corrupt record {key} in {namespace}: {reason}")]
    Corrupt {
        /// Namespace of the record.
        namespace: String,
        /// Key of the record.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The embedding provider failed to produce a vector.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
