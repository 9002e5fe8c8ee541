//! Feedback reader: drains the feedback service into entries.
//!
//! The fetch is all-or-nothing: any failure while connecting or reading
//! fails the whole call and no partial list is returned.

use std::io::ErrorKind;
use std::sync::Arc;

use apns_protocol::{FEEDBACK_TUPLE_LEN, FeedbackEntry};
use chrono::{DateTime, Months, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info};

use crate::config::PushConfig;
use crate::connection::ConnectionManager;
use crate::error::TransportError;

/// Entries at or before this instant are dropped.
pub fn retention_cutoff(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct FeedbackReader {
    connection: ConnectionManager,
    retention_months: u32,
}

impl FeedbackReader {
    pub fn new(tls: Arc<rustls::ClientConfig>, config: &PushConfig) -> Self {
        Self {
            connection: ConnectionManager::new(tls, config.feedback.clone()),
            retention_months: config.feedback_retention_months,
        }
    }

    /// Connect, read every tuple until the service closes the stream, and
    /// keep the entries newer than the retention cutoff.
    pub async fn fetch(&mut self) -> Result<Vec<FeedbackEntry>, TransportError> {
        info!("Connecting to feedback service {}", self.connection.endpoint());
        let result = self.drain().await;
        self.connection.disconnect().await;

        match &result {
            Ok(entries) if entries.is_empty() => info!("Feedback response is empty"),
            Ok(entries) => info!("Total {} feedback entries received", entries.len()),
            Err(e) => error!("Error occurred while receiving feedback: {e}"),
        }
        result
    }

    async fn drain(&mut self) -> Result<Vec<FeedbackEntry>, TransportError> {
        self.connection.connect().await?;
        let mut reader = self.connection.take_reader().ok_or(TransportError::NotConnected)?;
        let cutoff = retention_cutoff(Utc::now(), self.retention_months);

        let mut entries = Vec::new();
        let mut tuple = [0u8; FEEDBACK_TUPLE_LEN];
        loop {
            let filled = read_tuple(&mut reader, &mut tuple).await?;
            if filled == 0 {
                break;
            }
            if filled < FEEDBACK_TUPLE_LEN {
                return Err(TransportError::Feedback(format!(
                    "stream ended after {filled} of {FEEDBACK_TUPLE_LEN} tuple bytes"
                )));
            }

            let entry = FeedbackEntry::decode(&tuple)?;
            if entry.is_retained(cutoff) {
                debug!("Feedback entry for {} at {}", entry.device_token, entry.timestamp);
                entries.push(entry);
            } else {
                debug!("Dropping feedback entry for {} at {}", entry.device_token, entry.timestamp);
            }
        }
        Ok(entries)
    }
}

/// Fill `buf` from the stream. Returns the number of bytes read, which is
/// short only when the stream ended.
async fn read_tuple<R>(reader: &mut R, buf: &mut [u8]) -> Result<usize, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            // the service may close without a TLS close_notify
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(TransportError::Feedback(e.to_string())),
        }
    }
    Ok(filled)
}
