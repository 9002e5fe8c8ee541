//! Batch sender: pages a notification queue over gateway sessions.
//!
//! Each page gets its own session and its own correlation ids starting at
//! 1000. Frames are written one at a time with a pacing delay so a rejection
//! has time to arrive before the next write. A rejection or a failed write
//! ends the session; the next item opens a fresh one.

use std::sync::Arc;
use std::time::Duration;

use apns_protocol::{CorrelationId, Payload, ProtocolError, encode_notification};
use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, error, info};

use crate::config::PushConfig;
use crate::connection::ConnectionManager;
use crate::correlator::{CorrelatorEvent, Rejection, ResponseCorrelator};
use crate::error::TransportError;

/// Split `queue` into consecutive pages of at most `page_size` items.
pub fn pages<T>(queue: &[T], page_size: usize) -> std::slice::Chunks<'_, T> {
    queue.chunks(page_size.max(1))
}

/// Outcome of one `send` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Device tokens the gateway rejected, in the order detected
    pub rejected: Vec<String>,
    /// Full rejection records, parallel to `rejected`
    pub rejections: Vec<Rejection>,
    /// Frames written successfully
    pub sent: usize,
    /// Items skipped before any I/O (bad token, encoding failure)
    pub skipped: usize,
    /// Items lost to a connection or write failure
    pub failed: usize,
    /// Sessions opened
    pub sessions: usize,
}

pub struct BatchSender {
    config: PushConfig,
    connection: ConnectionManager,
    correlator: Option<ResponseCorrelator>,
}

impl BatchSender {
    pub fn new(tls: Arc<rustls::ClientConfig>, config: PushConfig) -> Self {
        let connection = ConnectionManager::new(tls, config.gateway.clone());
        Self {
            config,
            connection,
            correlator: None,
        }
    }

    /// Send the whole queue and report which device tokens were rejected.
    /// Individual failures are logged and never abort the batch.
    pub async fn send(&mut self, queue: &[Payload]) -> BatchReport {
        let page_size = self.config.effective_page_size();
        let page_count = queue.len().div_ceil(page_size);
        info!("Payload queue received: {} notifications in {page_count} page(s)", queue.len());

        let grace = self.config.disconnect_grace;
        let mut report = BatchReport::default();
        for (number, page) in pages(queue, page_size).enumerate() {
            debug!("Sending page {}/{page_count} ({} notifications)", number + 1, page.len());
            self.send_page(page, &mut report).await;
            self.close_session(&mut report, grace).await;
        }
        self.close_session(&mut report, grace).await;

        report.sessions = self.connection.sessions_opened();
        info!(
            "Batch finished: {} sent, {} rejected, {} skipped, {} failed over {} session(s)",
            report.sent,
            report.rejected.len(),
            report.skipped,
            report.failed,
            report.sessions
        );
        report
    }

    async fn send_page(&mut self, page: &[Payload], report: &mut BatchReport) {
        let tokens: Arc<[String]> = page.iter().map(|p| p.device_token.clone()).collect();

        for (index, payload) in page.iter().enumerate() {
            self.drain_events(report);

            let frame = match CorrelationId::for_index(index)
                .and_then(|id| encode_notification(payload, id, self.expiry()))
            {
                Ok(frame) => frame,
                Err(ProtocolError::PayloadInvalid(reason)) => {
                    error!(
                        "Invalid device token, possible simulator entry: {} ({reason})",
                        payload.device_token
                    );
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(
                        "Unable to generate payload for device token {}: {e}",
                        payload.device_token
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            debug!("Payload generated for {} : {}", payload.device_token, frame.json);

            if !self.connection.is_connected() {
                self.close_session(report, Duration::ZERO).await;
                if let Err(e) = self.open_session(tokens.clone()).await {
                    error!(
                        "No connection for device token {}, notification not sent: {e}",
                        payload.device_token
                    );
                    report.failed += 1;
                    continue;
                }
            }

            match self.connection.write_frame(&frame.bytes).await {
                Ok(()) => {
                    info!(
                        "Notification sent for device token {} (id {})",
                        payload.device_token, frame.id
                    );
                    report.sent += 1;
                    tokio::time::sleep(self.config.pacing).await;
                }
                Err(e) => {
                    error!(
                        "An error occurred sending payload for device token {}: {e}",
                        payload.device_token
                    );
                    report.failed += 1;
                }
            }
        }
    }

    async fn open_session(&mut self, page: Arc<[String]>) -> Result<(), TransportError> {
        self.connection.connect().await?;
        let reader = self.connection.take_reader().ok_or(TransportError::NotConnected)?;
        let session = self.connection.session_id().unwrap_or_default();
        self.correlator = Some(ResponseCorrelator::spawn(
            reader,
            page,
            self.config.response_read_timeout,
            session,
        ));
        Ok(())
    }

    /// Stop the correlator, fold in anything it reported, and disconnect.
    /// When the session is still live, wait `grace` first so a late
    /// rejection can still be read.
    async fn close_session(&mut self, report: &mut BatchReport, grace: Duration) {
        if self.correlator.is_none() && self.connection.session_id().is_none() {
            return;
        }
        if self.connection.is_connected() && !grace.is_zero() {
            tokio::time::sleep(grace).await;
        }
        if let Some(correlator) = self.correlator.take() {
            for event in correlator.stop().await {
                self.apply(event, report);
            }
        }
        self.connection.disconnect().await;
    }

    fn drain_events(&mut self, report: &mut BatchReport) {
        let mut events = Vec::new();
        if let Some(correlator) = self.correlator.as_mut() {
            while let Some(event) = correlator.try_next() {
                events.push(event);
            }
        }
        for event in events {
            self.apply(event, report);
        }
    }

    fn apply(&mut self, event: CorrelatorEvent, report: &mut BatchReport) {
        match event {
            CorrelatorEvent::Rejected(rejection) => {
                report.rejected.push(rejection.device_token.clone());
                report.rejections.push(rejection);
            }
            CorrelatorEvent::StreamClosed => {}
        }
        self.connection.mark_disconnected();
    }

    fn expiry(&self) -> DateTime<Utc> {
        let now = Utc::now();
        TimeDelta::from_std(self.config.expiry_offset)
            .ok()
            .and_then(|offset| now.checked_add_signed(offset))
            .unwrap_or(now)
    }
}
