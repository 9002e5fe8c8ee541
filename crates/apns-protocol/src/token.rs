//! Device token conversion between the 64-character hex text form and the
//! 32 raw bytes carried on the wire.

use crate::error::ProtocolError;

/// Raw device token length in bytes.
pub const DEVICE_TOKEN_LEN: usize = 32;

/// Device token length in hex characters.
pub const DEVICE_TOKEN_HEX_LEN: usize = DEVICE_TOKEN_LEN * 2;

/// Parse a hex device token into raw bytes.
///
/// The text must be exactly 64 characters; anything else is rejected with
/// [`ProtocolError::PayloadInvalid`] so the item never reaches the wire.
pub fn token_to_bytes(token: &str) -> Result<[u8; DEVICE_TOKEN_LEN], ProtocolError> {
    if token.len() != DEVICE_TOKEN_HEX_LEN {
        return Err(ProtocolError::payload_invalid(format!(
            "device token must be {DEVICE_TOKEN_HEX_LEN} hex characters, got {}",
            token.len()
        )));
    }
    let mut raw = [0u8; DEVICE_TOKEN_LEN];
    hex::decode_to_slice(token, &mut raw).map_err(|e| {
        ProtocolError::payload_invalid(format!("device token is not hex: {e}"))
    })?;
    Ok(raw)
}

/// Render raw token bytes as lowercase hex.
pub fn bytes_to_token(raw: &[u8]) -> String {
    hex::encode(raw)
}
