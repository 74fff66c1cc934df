//! Round-robin credential rotation for Keel providers.
//!
//! The rotation pointer is plain data: callers pass the persisted value in
//! and store the returned one. [`PointerStore`] is the file-backed home for
//! those values.

pub mod error;
pub mod pointer;
pub mod rotator;

pub use error::CredentialError;
pub use pointer::{PointerStore, rotate};
pub use rotator::{CredentialSet, Rotation, next_credential, parse_pointer};
