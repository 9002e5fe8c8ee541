//! Legacy binary push-notification protocol - types and codec
//!
//! Pure data layer shared by the transport and the CLI: the notification
//! payload model and its JSON document, device token conversion, the
//! gateway status table, and the binary frames (notification, response,
//! feedback tuple). Nothing in this crate performs I/O.

pub mod error;
pub mod feedback;
pub mod frame;
pub mod payload;
pub mod status;
pub mod token;

pub use error::ProtocolError;
pub use feedback::{FEEDBACK_TUPLE_LEN, FeedbackEntry};
pub use frame::{
    CorrelationId, NotificationFrame, ResponseFrame, encode_notification,
    FIRST_CORRELATION_ID, MAX_PAGE_SIZE, NOTIFICATION_COMMAND, RESPONSE_COMMAND,
    RESPONSE_FRAME_LEN,
};
pub use payload::{Alert, CustomFields, Payload, APS_KEY};
pub use status::{StatusCode, STATUS_TABLE, describe};
pub use token::{DEVICE_TOKEN_HEX_LEN, DEVICE_TOKEN_LEN, bytes_to_token, token_to_bytes};
