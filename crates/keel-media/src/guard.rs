//! Absolute upload-size ceiling.
//!
//! Independent of compression: compression only makes a payload smaller,
//! the guard decides whether it may be stored or sent at all.

use crate::error::MediaError;
use keel_types::AttachmentPayload;

/// Largest decoded attachment size accepted for upload (20 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Whether `byte_size` fits under [`MAX_UPLOAD_BYTES`]. The limit itself is allowed.
pub fn is_allowed(byte_size: u64) -> bool {
    byte_size <= MAX_UPLOAD_BYTES
}

/// Upload ceiling with a configurable limit, e.g. per provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadGuard {
    max_bytes: u64,
}

impl Default for UploadGuard {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

impl UploadGuard {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn allows(&self, byte_size: u64) -> bool {
        byte_size <= self.max_bytes
    }

    /// Reject `byte_size` with [`MediaError::SizeRejected`] when over the limit.
    pub fn check(&self, byte_size: u64) -> Result<(), MediaError> {
        if self.allows(byte_size) {
            Ok(())
        } else {
            Err(MediaError::SizeRejected {
                size: byte_size,
                limit: self.max_bytes,
            })
        }
    }

    /// Check a payload by its decoded size.
    pub fn check_payload(&self, payload: &AttachmentPayload) -> Result<(), MediaError> {
        self.check(payload.decoded_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_inclusive() {
        assert!(is_allowed(MAX_UPLOAD_BYTES));
        assert!(!is_allowed(MAX_UPLOAD_BYTES + 1));
        assert!(is_allowed(0));
    }

    #[test]
    fn default_guard_matches_constant() {
        let guard = UploadGuard::default();
        assert_eq!(guard.max_bytes(), MAX_UPLOAD_BYTES);
        assert!(guard.allows(MAX_UPLOAD_BYTES));
        assert!(!guard.allows(MAX_UPLOAD_BYTES + 1));
    }

    #[test]
    fn check_reports_size_and_limit() {
        let guard = UploadGuard::new(10);
        assert!(guard.check(10).is_ok());
        match guard.check(11) {
            Err(MediaError::SizeRejected { size, limit }) => {
                assert_eq!(size, 11);
                assert_eq!(limit, 10);
            }
            other => panic!("expected SizeRejected, got: {:?}", other),
        }
    }

    #[test]
    fn check_payload_uses_decoded_size() {
        // 8 base64 chars with one pad = 5 decoded bytes
        let payload = AttachmentPayload::new("text/plain", "aGVsbG8=");
        assert!(UploadGuard::new(5).check_payload(&payload).is_ok());
        let err = UploadGuard::new(4).check_payload(&payload).unwrap_err();
        assert!(err.is_size_rejection());
    }
}
