//! Transport encoding for stored files
//!
//! The contents API carries file bodies as standard base64 and wraps the
//! encoded text across lines when returning it.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::RemoteError;

pub fn to_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 body, ignoring line breaks and other ASCII whitespace
pub fn from_transport(encoded: &str) -> Result<Vec<u8>, RemoteError> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| RemoteError::Decode(format!("invalid base64: {}", e)))
}
