//! Credential rotation error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("No credentials configured")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
