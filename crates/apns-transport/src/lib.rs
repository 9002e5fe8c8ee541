//! Push gateway transport
//!
//! Talks to the legacy binary push gateway and its feedback service over
//! mutually-authenticated TLS. The transport layer handles:
//! - Client certificate loading and TLS configuration
//! - Connection lifecycle (connect, write, disconnect)
//! - Paging a notification queue across sessions
//! - Correlating asynchronous rejection responses back to payloads
//! - Draining the feedback stream
//!
//! Frame layouts and the payload model live in `apns-protocol`.

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod feedback;
pub mod identity;
pub mod sender;

pub use client::PushClient;
pub use config::{Endpoint, Environment, PushConfig};
pub use connection::{ConnectionManager, ConnectionState};
pub use correlator::{CorrelatorEvent, Rejection, ResponseCorrelator};
pub use error::TransportError;
pub use feedback::FeedbackReader;
pub use identity::ClientIdentity;
pub use sender::{BatchReport, BatchSender, pages};
