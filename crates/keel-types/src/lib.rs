//! Shared types, byte estimation and error hierarchy for Keel.

pub mod bytes;
pub mod error;
pub mod message;

pub use bytes::{estimate_bytes, estimate_data_url_bytes, estimate_json_bytes};
pub use error::ConfigError;
pub use message::*;
