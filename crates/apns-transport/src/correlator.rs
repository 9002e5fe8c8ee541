//! Response correlator: background reader for gateway error responses.
//!
//! The gateway only ever answers with an error frame and then closes the
//! stream, so the correlator reads at most one frame per session. It maps the
//! frame's correlation id back to the page item and reports it over a
//! channel; the batch sender, as owner of the connection state, applies it.

use std::sync::Arc;
use std::time::Duration;

use apns_protocol::{CorrelationId, ProtocolError, RESPONSE_FRAME_LEN, ResponseFrame, StatusCode};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::TransportError;

/// A notification the gateway refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub id: CorrelationId,
    /// Position of the payload within its page
    pub index: usize,
    pub status: StatusCode,
    pub device_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorrelatorEvent {
    Rejected(Rejection),
    /// The gateway ended the stream without an error frame.
    StreamClosed,
}

pub struct ResponseCorrelator {
    task: JoinHandle<()>,
    events: mpsc::UnboundedReceiver<CorrelatorEvent>,
}

impl ResponseCorrelator {
    /// Start reading `reader` in the background. `page` holds the device
    /// tokens of the page being sent, indexed by position.
    pub fn spawn<R>(reader: R, page: Arc<[String]>, read_timeout: Duration, session: Uuid) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, events) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(reader, page, read_timeout, tx, session));
        Self { task, events }
    }

    /// Next pending event, without waiting.
    pub fn try_next(&mut self) -> Option<CorrelatorEvent> {
        self.events.try_recv().ok()
    }

    /// Stop the reader and return every event it produced but nobody took.
    pub async fn stop(mut self) -> Vec<CorrelatorEvent> {
        self.task.abort();
        let _ = (&mut self.task).await;
        let mut pending = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            pending.push(event);
        }
        pending
    }
}

impl Drop for ResponseCorrelator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run<R>(
    mut reader: R,
    page: Arc<[String]>,
    read_timeout: Duration,
    tx: mpsc::UnboundedSender<CorrelatorEvent>,
    session: Uuid,
) where
    R: AsyncRead + Unpin,
{
    match read_response(&mut reader, read_timeout).await {
        Ok(Some(frame)) => {
            if let Some(rejection) = correlate(&frame, &page, session) {
                if tx.send(CorrelatorEvent::Rejected(rejection)).is_err() {
                    debug!("Rejection dropped, batch sender already stopped (session {session})");
                }
            }
        }
        Ok(None) => {
            warn!("Gateway closed the stream (session {session})");
            if tx.send(CorrelatorEvent::StreamClosed).is_err() {
                debug!("Stream close not reported, sender already stopped (session {session})");
            }
        }
        Err(e) => {
            error!("An error occurred while reading the gateway response (session {session}): {e}");
        }
    }
}

/// Read one response frame. `Ok(None)` means the stream ended before any
/// byte arrived.
async fn read_response<R>(
    reader: &mut R,
    read_timeout: Duration,
) -> Result<Option<ResponseFrame>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut frame = [0u8; RESPONSE_FRAME_LEN];
    match reader.read(&mut frame[..1]).await {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) if is_stream_end(&e) => {
            debug!("Response stream ended: {e}");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    }

    match tokio::time::timeout(read_timeout, reader.read_exact(&mut frame[1..])).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => {
            return Err(ProtocolError::malformed(format!("response frame cut short: {e}")).into());
        }
        Err(_) => {
            return Err(
                ProtocolError::malformed("response frame incomplete within read timeout").into(),
            );
        }
    }

    Ok(Some(ResponseFrame::decode(&frame)?))
}

fn is_stream_end(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}

/// Map a response frame to the page item it refers to.
pub fn correlate(frame: &ResponseFrame, page: &[String], session: Uuid) -> Option<Rejection> {
    let Some((index, device_token)) = frame
        .id
        .page_index()
        .and_then(|index| page.get(index).map(|token| (index, token)))
    else {
        error!(
            "Response id {} does not match any of the {} payloads in this page (session {session})",
            frame.id,
            page.len()
        );
        return None;
    };

    error!(
        "Gateway rejected payload for device token {device_token} (id {}, session {session})",
        frame.id
    );
    error!("Gateway status: {}", frame.status);
    error!("Connection terminated by the gateway (session {session})");

    Some(Rejection {
        id: frame.id,
        index,
        status: frame.status,
        device_token: device_token.clone(),
    })
}
