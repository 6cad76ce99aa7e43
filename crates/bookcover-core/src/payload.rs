//! Cover image payloads sent as multipart text fields
//!
//! Browsers send covers either as raw PNG bytes, bare base64, or a
//! `data:image/png;base64,...` URL.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::CoverError;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Normalise a cover payload to PNG bytes
pub fn decode_cover_payload(payload: &[u8]) -> Result<Vec<u8>, CoverError> {
    if payload.starts_with(PNG_SIGNATURE) {
        return Ok(payload.to_vec());
    }

    let text = std::str::from_utf8(payload)
        .map_err(|_| CoverError::PayloadError("Payload is neither PNG nor text".into()))?
        .trim();

    if text.is_empty() {
        return Err(CoverError::PayloadError("Payload is empty".into()));
    }

    let encoded = match text.strip_prefix("data:") {
        Some(data_url) => {
            let (header, body) = data_url
                .split_once(',')
                .ok_or_else(|| CoverError::PayloadError("Malformed data URL".into()))?;
            if !header.ends_with(";base64") {
                return Err(CoverError::PayloadError(format!(
                    "Unsupported data URL encoding: {}",
                    header
                )));
            }
            body
        }
        None => text,
    };

    // Form encoding may have folded the base64 across lines
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    BASE64
        .decode(compact)
        .map_err(|e| CoverError::PayloadError(format!("Invalid base64: {}", e)))
}
