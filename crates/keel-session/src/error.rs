//! Session-specific error types.

use keel_types::ConfigError;
use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },

    #[error("Invalid session id '{id}'")]
    InvalidId { id: String },

    #[error("Ambiguous session prefix '{prefix}': matches {count} sessions")]
    AmbiguousPrefix { prefix: String, count: usize },

    #[error("No sessions match prefix '{prefix}'")]
    PrefixNotFound { prefix: String },

    #[error("Storage policy error: {0}")]
    Policy(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
