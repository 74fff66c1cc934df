//! In-storage byte size estimation for persisted values.

use serde::Serialize;

/// Decoded byte length of a standard base64 string.
///
/// Computed from the encoded length: every 4 characters carry 3 bytes and
/// each trailing `=` removes one byte. Exact for valid base64, padded or not.
pub fn estimate_bytes(encoded: &str) -> u64 {
    let encoded = encoded.trim_end();
    let padding = encoded
        .as_bytes()
        .iter()
        .rev()
        .take(2)
        .take_while(|&&b| b == b'=')
        .count() as u64;
    let len = encoded.len() as u64;
    (len * 3 / 4).saturating_sub(padding)
}

/// Decoded byte length of a `data:<mime>;base64,<payload>` URL.
///
/// Plain base64 input without a data-URL header is estimated as-is.
pub fn estimate_data_url_bytes(value: &str) -> u64 {
    match value.split_once(";base64,") {
        Some((header, payload)) if header.starts_with("data:") => estimate_bytes(payload),
        _ => estimate_bytes(value),
    }
}

/// Size of a value as the store writes it (compact JSON).
pub fn estimate_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<u64, serde_json::Error> {
    Ok(serde_json::to_vec(value)?.len() as u64)
}
