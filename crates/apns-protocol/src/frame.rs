//! Binary frames exchanged with the notification gateway.
//!
//! Outbound notification:
//!
//! ```text
//! [1 command=1][N correlation id, ASCII decimal][4 expiry, host byte order]
//! [2 token length=32, BE][32 token][2 payload length, BE][payload JSON]
//! ```
//!
//! Inbound response: `[1 command][1 status][4 correlation id, ASCII decimal]`.
//!
//! The correlation id travels as decimal text in both directions. Ids run
//! from 1000 up to 1000 + page size - 1, so with pages of at most
//! [`MAX_PAGE_SIZE`] items they are always four characters, which is what
//! the four-byte id field of the response expects.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::ProtocolError;
use crate::payload::Payload;
use crate::status::StatusCode;
use crate::token::{DEVICE_TOKEN_LEN, token_to_bytes};

/// Command byte of an outbound notification frame.
pub const NOTIFICATION_COMMAND: u8 = 1;

/// Command byte the gateway uses for error responses.
pub const RESPONSE_COMMAND: u8 = 8;

/// Correlation id of the first item in a page.
pub const FIRST_CORRELATION_ID: u32 = 1000;

/// Largest page that keeps every correlation id at four decimal digits.
pub const MAX_PAGE_SIZE: usize = 8999;

/// Response frame length in bytes.
pub const RESPONSE_FRAME_LEN: usize = 6;

const CORRELATION_ID_WIRE_LEN: usize = 4;

// ─────────────────────────────────────────────────────────────────────────────
// Correlation id
// ─────────────────────────────────────────────────────────────────────────────

/// Per-page sequence number linking a frame to its rejection response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId(u32);

impl CorrelationId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Id for the item at `index` within its page.
    pub fn for_index(index: usize) -> Result<Self, ProtocolError> {
        if index >= MAX_PAGE_SIZE {
            return Err(ProtocolError::encoding(format!(
                "page index {index} exceeds the correlation id range"
            )));
        }
        // index < 8999, the cast cannot truncate
        Ok(Self(FIRST_CORRELATION_ID + index as u32))
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Zero-based position within the page, if the id is in range.
    pub fn page_index(&self) -> Option<usize> {
        self.0.checked_sub(FIRST_CORRELATION_ID).map(|i| i as usize)
    }

    pub fn to_ascii(&self) -> String {
        self.0.to_string()
    }

    /// Parse the decimal text form used on the wire.
    pub fn parse_ascii(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ProtocolError::malformed("correlation id is not ASCII text"))?;
        text.parse::<u32>()
            .map(Self)
            .map_err(|_| {
                ProtocolError::malformed(format!(
                    "correlation id '{}' is not decimal",
                    text.escape_debug()
                ))
            })
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound notification
// ─────────────────────────────────────────────────────────────────────────────

/// An encoded notification ready to be written to the gateway.
#[derive(Debug, Clone)]
pub struct NotificationFrame {
    pub id: CorrelationId,
    /// The JSON document carried in the frame
    pub json: String,
    pub bytes: Bytes,
}

/// Encode `payload` with correlation id `id`, expiring at `expiry`.
///
/// Fails with [`ProtocolError::PayloadInvalid`] for a bad device token and
/// [`ProtocolError::Encoding`] when a field does not fit its wire width.
pub fn encode_notification(
    payload: &Payload,
    id: CorrelationId,
    expiry: DateTime<Utc>,
) -> Result<NotificationFrame, ProtocolError> {
    let token = token_to_bytes(&payload.device_token)?;
    let json = payload.to_json()?;
    let json_len = u16::try_from(json.len()).map_err(|_| {
        ProtocolError::encoding(format!("payload of {} bytes exceeds the length field", json.len()))
    })?;
    let expiry_secs = i32::try_from(expiry.timestamp())
        .map_err(|_| ProtocolError::encoding("expiry outside 32-bit epoch seconds"))?;
    let id_text = id.to_ascii();

    let frame_len = 1 + id_text.len() + 4 + 2 + DEVICE_TOKEN_LEN + 2 + json.len();
    let mut buf = BytesMut::with_capacity(frame_len);
    buf.put_u8(NOTIFICATION_COMMAND);
    buf.put_slice(id_text.as_bytes());
    buf.put_slice(&expiry_secs.to_ne_bytes());
    buf.put_u16(DEVICE_TOKEN_LEN as u16);
    buf.put_slice(&token);
    buf.put_u16(json_len);
    buf.put_slice(json.as_bytes());

    Ok(NotificationFrame {
        id,
        json,
        bytes: buf.freeze(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound response
// ─────────────────────────────────────────────────────────────────────────────

/// Error response sent by the gateway before it closes the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseFrame {
    pub command: u8,
    pub status: StatusCode,
    pub id: CorrelationId,
}

impl ResponseFrame {
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() != RESPONSE_FRAME_LEN {
            return Err(ProtocolError::malformed(format!(
                "response frame must be {RESPONSE_FRAME_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            command: bytes[0],
            status: StatusCode::from_code(bytes[1]),
            id: CorrelationId::parse_ascii(&bytes[2..])?,
        })
    }

    pub fn encode(&self) -> Result<[u8; RESPONSE_FRAME_LEN], ProtocolError> {
        let id_text = self.id.to_ascii();
        if id_text.len() != CORRELATION_ID_WIRE_LEN {
            return Err(ProtocolError::encoding(format!(
                "correlation id {} does not fit the response id field",
                self.id
            )));
        }
        let mut out = [0u8; RESPONSE_FRAME_LEN];
        out[0] = self.command;
        out[1] = self.status.code();
        out[2..].copy_from_slice(id_text.as_bytes());
        Ok(out)
    }
}
