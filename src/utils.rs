use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

use crate::errors::VerificationError;

/// Decodes a base64url string without padding, the encoding WebAuthn uses for
/// credential IDs, challenges and user handles on the wire.
pub fn base64url_decode(input: &str) -> Result<Vec<u8>, VerificationError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(input)
        .map_err(|_| VerificationError::Base64Decode)?;
    Ok(decoded)
}

/// Encodes bytes as base64url without padding.
pub fn base64url_encode(input: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(input)
}
