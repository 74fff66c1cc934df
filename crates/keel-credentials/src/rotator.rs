//! Credential parsing and pointer-based selection.

use crate::error::CredentialError;

/// An ordered list of equivalent, non-empty credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSet {
    credentials: Vec<String>,
}

/// The credential chosen for one request and the pointer to persist after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rotation {
    pub credential: String,
    /// Index of `credential` in its set.
    pub index: usize,
    pub next_pointer: usize,
}

impl Rotation {
    /// Credential with everything but the outer characters hidden, for display.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.credential.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl CredentialSet {
    /// Parse a raw credential field. Commas separate equivalent credentials;
    /// whitespace around each is trimmed and blank entries are dropped.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let credentials: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if credentials.is_empty() {
            return Err(CredentialError::Empty);
        }
        Ok(Self { credentials })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Always false: [`CredentialSet::parse`] rejects fields with no
    /// credentials. Kept alongside [`CredentialSet::len`].
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.credentials
    }

    /// Whether there is more than one credential to rotate through.
    pub fn is_rotating(&self) -> bool {
        self.credentials.len() > 1
    }

    /// Select the credential at `persisted_pointer` and compute the next one.
    ///
    /// A missing, negative or out-of-range pointer resets to 0 rather than
    /// wrapping, so rotation restarts from the first credential when the
    /// list shrinks.
    pub fn next(&self, persisted_pointer: Option<i64>) -> Rotation {
        let len = self.credentials.len();
        let index = persisted_pointer
            .and_then(|p| usize::try_from(p).ok())
            .filter(|&p| p < len)
            .unwrap_or(0);
        Rotation {
            credential: self.credentials[index].clone(),
            index,
            next_pointer: (index + 1) % len,
        }
    }
}

/// Interpret a persisted pointer value. Non-numeric input yields `None`.
pub fn parse_pointer(raw: &str) -> Option<i64> {
    raw.trim().parse().ok()
}

/// Parse `raw_field` and select the credential for `persisted_pointer`.
pub fn next_credential(
    raw_field: &str,
    persisted_pointer: Option<i64>,
) -> Result<Rotation, CredentialError> {
    Ok(CredentialSet::parse(raw_field)?.next(persisted_pointer))
}
