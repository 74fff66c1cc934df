//! Media pipeline error types.

use thiserror::Error;

/// Errors from the attachment pipeline.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The payload could not be decoded. The attachment must be rejected.
    #[error("Failed to decode media: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The payload exceeds the upload ceiling. Shown to the user as "file too large".
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    SizeRejected { size: u64, limit: u64 },

    #[error("Re-encoding did not shrink the image ({input_bytes} → {output_bytes} bytes)")]
    NotReduced {
        width: u32,
        height: u32,
        input_bytes: u64,
        output_bytes: u64,
    },

    #[error("Invalid compression options: {0}")]
    InvalidOptions(String),

    #[error("Compression task failed: {0}")]
    Task(String),
}

impl MediaError {
    /// Whether this is a size rejection rather than a processing failure.
    pub fn is_size_rejection(&self) -> bool {
        matches!(self, MediaError::SizeRejected { .. })
    }
}
