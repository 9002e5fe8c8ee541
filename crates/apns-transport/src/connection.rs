//! Connection manager: owns one TLS session to a gateway host.
//!
//! The manager is the single owner of the connection state. It does not
//! retry: a failed connect leaves it `Disconnected` and the caller decides
//! when to try again. The stream is split on connect so a background reader
//! can take the read half while the owner keeps writing.

use std::sync::Arc;

use rustls::pki_types::ServerName;
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Endpoint;
use crate::error::TransportError;

pub type GatewayStream = TlsStream<TcpStream>;
pub type GatewayReader = ReadHalf<GatewayStream>;
pub type GatewayWriter = WriteHalf<GatewayStream>;

/// Lifecycle of a gateway session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
}

pub struct ConnectionManager {
    connector: TlsConnector,
    endpoint: Endpoint,
    state: ConnectionState,
    /// Id of the current session, for log correlation
    session_id: Option<Uuid>,
    reader: Option<GatewayReader>,
    writer: Option<GatewayWriter>,
    /// Sessions successfully established over the manager's lifetime
    sessions_opened: usize,
}

impl ConnectionManager {
    pub fn new(tls: Arc<rustls::ClientConfig>, endpoint: Endpoint) -> Self {
        Self {
            connector: TlsConnector::from(tls),
            endpoint,
            state: ConnectionState::Disconnected,
            session_id: None,
            reader: None,
            writer: None,
            sessions_opened: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions_opened
    }

    /// Open a new session: TCP connect, then TLS handshake presenting the
    /// client certificate. Any leftover stream from a previous session is
    /// released first.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        self.release();
        let session_id = Uuid::new_v4();
        let endpoint = self.endpoint.to_string();

        self.state = ConnectionState::Connecting;
        info!("Connecting to {endpoint} (session {session_id})");

        let address = (self.endpoint.host.as_str(), self.endpoint.port);
        let tcp = match TcpStream::connect(address).await {
            Ok(tcp) => tcp,
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                error!("Failed to connect to {endpoint}: {source}");
                return Err(TransportError::Connect { endpoint, source });
            }
        };

        self.state = ConnectionState::Handshaking;
        debug!("Creating TLS session with {endpoint} (session {session_id})");

        let server_name = match ServerName::try_from(self.endpoint.host.clone()) {
            Ok(name) => name,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                let source = std::io::Error::new(std::io::ErrorKind::InvalidInput, e);
                return Err(TransportError::Handshake { endpoint, source });
            }
        };

        let stream = match self.connector.connect(server_name, tcp).await {
            Ok(stream) => stream,
            Err(source) => {
                self.state = ConnectionState::Disconnected;
                error!("TLS handshake with {endpoint} failed: {source}");
                return Err(TransportError::Handshake { endpoint, source });
            }
        };

        let (reader, writer) = tokio::io::split(stream);
        self.reader = Some(reader);
        self.writer = Some(writer);
        self.session_id = Some(session_id);
        self.sessions_opened += 1;
        self.state = ConnectionState::Connected;
        info!("Connected to {endpoint} (session {session_id})");
        Ok(())
    }

    /// Hand the read half to a reader task. Returns `None` once taken.
    pub fn take_reader(&mut self) -> Option<GatewayReader> {
        self.reader.take()
    }

    /// Write one complete frame. A failed write leaves the manager
    /// `Disconnected`.
    pub async fn write_frame(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.state != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let Some(writer) = self.writer.as_mut() else {
            self.state = ConnectionState::Disconnected;
            return Err(TransportError::NotConnected);
        };

        let result = match writer.write_all(bytes).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.mark_disconnected();
            return Err(e.into());
        }
        Ok(())
    }

    /// Record that the session is no longer usable. The stream itself is
    /// released on the next `connect` or `disconnect`.
    pub fn mark_disconnected(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!("Session {} marked disconnected", self.session_label());
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Close the session, sending TLS close_notify when the stream is still
    /// writable. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        let had_session = self.session_id.is_some();
        if let Some(mut writer) = self.writer.take() {
            if self.state == ConnectionState::Connected {
                if let Err(e) = writer.shutdown().await {
                    debug!("Error while closing session {}: {e}", self.session_label());
                }
            }
        }
        self.reader = None;
        self.state = ConnectionState::Disconnected;
        if had_session {
            info!("Disconnected from {} (session {})", self.endpoint, self.session_label());
        }
        self.session_id = None;
    }

    fn release(&mut self) {
        self.reader = None;
        self.writer = None;
        self.session_id = None;
        self.state = ConnectionState::Disconnected;
    }

    fn session_label(&self) -> String {
        self.session_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into())
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("sessions_opened", &self.sessions_opened)
            .finish()
    }
}
