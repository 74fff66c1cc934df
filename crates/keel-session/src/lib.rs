//! Session persistence and quota-aware eviction for Keel.

pub mod error;
pub mod policy;
pub mod store;
pub mod types;

pub use error::SessionError;
pub use keel_types::{estimate_bytes, estimate_data_url_bytes, estimate_json_bytes};
pub use policy::{PolicyConfig, PolicyOutcome, apply_policy, newest_first};
pub use store::SessionStore;
pub use types::{Session, SessionSummary};
