//! Inbound payload normalization.
//!
//! Every message is broadcast as a single line: embedded newlines become
//! spaces and surrounding whitespace is trimmed.

use axum::extract::ws::Utf8Bytes;

use crate::error::ConnectionError;

/// Collapses newlines to spaces and trims surrounding whitespace.
///
/// Normalizing an already normalized message returns it unchanged.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.replace('\n', " ").trim().to_string()
}

/// Validates a raw inbound frame against `limit` and returns the normalized
/// payload ready for broadcast.
///
/// # Errors
///
/// Returns [`ConnectionError::MessageTooLarge`] if `raw` is longer than
/// `limit` bytes, or [`ConnectionError::InvalidUtf8`] if it is not UTF-8.
pub fn prepare(raw: &[u8], limit: usize) -> Result<Utf8Bytes, ConnectionError> {
    if raw.len() > limit {
        return Err(ConnectionError::MessageTooLarge {
            size: raw.len(),
            limit,
        });
    }
    let text = std::str::from_utf8(raw)?;
    Ok(Utf8Bytes::from(normalize(text)))
}
