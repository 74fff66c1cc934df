//! File-backed persistence for rotation pointers.
//!
//! Pointers live in one JSON object keyed by provider. Reads and writes are
//! not locked: concurrent rotations may reuse or skip a credential, which is
//! harmless because the credentials are equivalent.

use crate::error::CredentialError;
use crate::rotator::{CredentialSet, Rotation};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Persisted rotation pointers, one per provider.
pub struct PointerStore {
    path: PathBuf,
}

impl PointerStore {
    /// Store pointers in `<config_dir>/rotation.json`.
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: config_dir.join("rotation.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted pointer for `provider`.
    ///
    /// Missing files, missing entries and non-numeric values all read as `None`.
    pub async fn get(&self, provider: &str) -> Result<Option<i64>, CredentialError> {
        let pointers = self.read_all().await?;
        Ok(pointers.get(provider).and_then(pointer_value))
    }

    /// Persist `pointer` for `provider` (atomic write: .tmp → rename).
    pub async fn set(&self, provider: &str, pointer: usize) -> Result<(), CredentialError> {
        let mut pointers = self.read_all().await?;
        pointers.insert(provider.to_string(), Value::from(pointer));

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let json = serde_json::to_string_pretty(&Value::Object(pointers))?;
        tokio::fs::write(&tmp_path, json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    async fn read_all(&self) -> Result<Map<String, Value>, CredentialError> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!(
                    "Ignoring unreadable rotation pointers in {}",
                    self.path.display()
                );
                Ok(Map::new())
            }
        }
    }
}

/// Accept numbers and numeric strings; anything else is no pointer.
fn pointer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => crate::rotator::parse_pointer(s),
        _ => None,
    }
}

/// Select the next credential for `provider` from `raw_field` and persist
/// the advanced pointer. Single-credential fields leave the store untouched.
pub async fn rotate(
    store: &PointerStore,
    provider: &str,
    raw_field: &str,
) -> Result<Rotation, CredentialError> {
    let set = CredentialSet::parse(raw_field)?;
    if !set.is_rotating() {
        return Ok(set.next(None));
    }

    let rotation = set.next(store.get(provider).await?);
    store.set(provider, rotation.next_pointer).await?;
    tracing::debug!(
        "Using credential {}/{} for {}",
        rotation.index + 1,
        set.len(),
        provider
    );
    Ok(rotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pointer_value_variants() {
        assert_eq!(pointer_value(&json!(2)), Some(2));
        assert_eq!(pointer_value(&json!("4")), Some(4));
        assert_eq!(pointer_value(&json!(-1)), Some(-1));
        assert_eq!(pointer_value(&json!("x")), None);
        assert_eq!(pointer_value(&json!(1.5)), None);
        assert_eq!(pointer_value(&json!(null)), None);
    }
}
