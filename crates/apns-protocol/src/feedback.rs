//! Feedback service tuples: `[4 timestamp, BE][2 token length][32 token]`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ProtocolError;
use crate::token::{DEVICE_TOKEN_HEX_LEN, DEVICE_TOKEN_LEN, bytes_to_token, token_to_bytes};

/// Feedback tuple length in bytes.
pub const FEEDBACK_TUPLE_LEN: usize = 4 + 2 + DEVICE_TOKEN_LEN;

/// A device the feedback service reports as no longer reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEntry {
    pub timestamp: DateTime<Utc>,
    /// Lowercase 64-character hex device token
    #[serde(rename = "deviceToken")]
    pub device_token: String,
}

impl FeedbackEntry {
    pub fn decode(tuple: &[u8]) -> Result<Self, ProtocolError> {
        if tuple.len() != FEEDBACK_TUPLE_LEN {
            return Err(ProtocolError::malformed(format!(
                "feedback tuple must be {FEEDBACK_TUPLE_LEN} bytes, got {}",
                tuple.len()
            )));
        }
        let seconds = u32::from_be_bytes([tuple[0], tuple[1], tuple[2], tuple[3]]);
        let timestamp = DateTime::from_timestamp(i64::from(seconds), 0)
            .ok_or_else(|| {
                ProtocolError::malformed(format!("feedback timestamp {seconds} out of range"))
            })?;
        // bytes 4..6 carry the token length and are not used
        Ok(Self {
            timestamp,
            device_token: bytes_to_token(&tuple[6..]),
        })
    }

    pub fn encode(&self) -> Result<[u8; FEEDBACK_TUPLE_LEN], ProtocolError> {
        let seconds = u32::try_from(self.timestamp.timestamp())
            .map_err(|_| ProtocolError::encoding("feedback timestamp outside 32-bit range"))?;
        let token = token_to_bytes(&self.device_token)?;
        let mut out = [0u8; FEEDBACK_TUPLE_LEN];
        out[..4].copy_from_slice(&seconds.to_be_bytes());
        out[4..6].copy_from_slice(&(DEVICE_TOKEN_LEN as u16).to_be_bytes());
        out[6..].copy_from_slice(&token);
        Ok(out)
    }

    /// Kept when the token is well-formed and the timestamp is after `cutoff`.
    pub fn is_retained(&self, cutoff: DateTime<Utc>) -> bool {
        self.device_token.len() == DEVICE_TOKEN_HEX_LEN && self.timestamp > cutoff
    }
}
