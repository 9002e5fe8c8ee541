//! Shared fixtures: throwaway certificates and in-process TLS mock services
//! speaking the gateway and feedback wire formats.

#![allow(dead_code)]

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use apns_transport::{ClientIdentity, Endpoint, PushConfig};
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::x509::X509;
use parking_lot::Mutex;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use secrecy::SecretString;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

pub const PASSPHRASE: &str = "test-passphrase";

pub const TOKENS: [&str; 7] = [
    "0000000000000000000000000000000000000000000000000000000000000000",
    "1111111111111111111111111111111111111111111111111111111111111111",
    "2222222222222222222222222222222222222222222222222222222222222222",
    "3333333333333333333333333333333333333333333333333333333333333333",
    "4444444444444444444444444444444444444444444444444444444444444444",
    "5555555555555555555555555555555555555555555555555555555555555555",
    "6666666666666666666666666666666666666666666666666666666666666666",
];

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// The client certificate every mock service trusts, and its bundle.
struct TrustedClient {
    leaf: CertificateDer<'static>,
    bundle: Vec<u8>,
}

static TRUSTED_CLIENT: LazyLock<TrustedClient> = LazyLock::new(|| {
    let (leaf, bundle) = self_signed_bundle(PASSPHRASE);
    TrustedClient { leaf, bundle }
});

fn self_signed_bundle(passphrase: &str) -> (CertificateDer<'static>, Vec<u8>) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["push-client.test".to_string()]).unwrap();
    let x509 = X509::from_der(cert.der()).unwrap();
    let pkey = PKey::private_key_from_pkcs8(&key_pair.serialize_der()).unwrap();

    let bundle = Pkcs12::builder()
        .name("push-client")
        .pkey(&pkey)
        .cert(&x509)
        .build2(passphrase)
        .unwrap()
        .to_der()
        .unwrap();
    (cert.der().clone(), bundle)
}

/// A fresh self-signed client certificate packed as a DER PKCS#12 bundle.
/// The mock services do not trust it.
pub fn client_bundle(passphrase: &str) -> Vec<u8> {
    self_signed_bundle(passphrase).1
}

/// Identity the mock services accept.
pub fn client_identity() -> ClientIdentity {
    let passphrase = SecretString::from(PASSPHRASE);
    ClientIdentity::from_pkcs12(&TRUSTED_CLIENT.bundle, &passphrase).unwrap()
}

/// Identity with a certificate the mock services do not trust.
pub fn untrusted_identity() -> ClientIdentity {
    let passphrase = SecretString::from(PASSPHRASE);
    ClientIdentity::from_pkcs12(&client_bundle(PASSPHRASE), &passphrase).unwrap()
}

pub fn client_tls() -> Arc<rustls::ClientConfig> {
    client_identity().into_tls_config().unwrap()
}

/// Short timings so sessions turn over quickly.
pub fn test_config(gateway: Endpoint, feedback: Endpoint) -> PushConfig {
    PushConfig::sandbox()
        .with_gateway(gateway)
        .with_feedback(feedback)
        .with_pacing(ms(20))
        .with_disconnect_grace(ms(100))
        .with_response_read_timeout(ms(100))
}

/// An endpoint nothing listens on.
pub async fn refused_endpoint() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Endpoint::new("127.0.0.1", port)
}

/// TLS acceptor that requires the trusted client certificate.
fn acceptor() -> TlsAcceptor {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut roots = RootCertStore::empty();
    roots.add(TRUSTED_CLIENT.leaf.clone()).unwrap();
    let client_verifier =
        WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .unwrap();

    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(vec![cert.der().clone()], key)
        .unwrap();
    TlsAcceptor::from(Arc::new(config))
}

/// Number of certificates the client presented on this session.
fn presented_certificates(stream: &TlsStream<TcpStream>) -> usize {
    stream.get_ref().1.peer_certificates().map_or(0, |chain| chain.len())
}

/// Sessions a mock service accepted, with the client chain length of each.
#[derive(Clone, Default)]
pub struct SessionLog {
    peer_chains: Arc<Mutex<Vec<usize>>>,
}

impl SessionLog {
    fn record(&self, stream: &TlsStream<TcpStream>) {
        self.peer_chains.lock().push(presented_certificates(stream));
    }

    pub fn sessions(&self) -> usize {
        self.peer_chains.lock().len()
    }

    /// Client certificate chain length per accepted session.
    pub fn peer_chains(&self) -> Vec<usize> {
        self.peer_chains.lock().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// A notification frame as the mock gateway received it.
#[derive(Debug, Clone)]
pub struct ReceivedFrame {
    pub command: u8,
    pub id: String,
    pub expiry: i32,
    pub device_token: String,
    pub json: String,
    pub raw: Vec<u8>,
}

/// How the mock gateway treats a session.
#[derive(Debug, Clone, Copy)]
pub enum GatewayMode {
    /// Read every frame, never answer
    Accept,
    /// Answer the frame carrying this id with this status, then close
    Reject(&'static str, u8),
    /// Close without a response after this many frames in a session
    CloseAfter(usize),
}

#[derive(Clone, Default)]
pub struct GatewayLog {
    pub frames: Arc<Mutex<Vec<ReceivedFrame>>>,
    pub sessions: SessionLog,
}

impl GatewayLog {
    pub fn frames(&self) -> Vec<ReceivedFrame> {
        self.frames.lock().clone()
    }

    pub fn sessions(&self) -> usize {
        self.sessions.sessions()
    }

    pub fn peer_chains(&self) -> Vec<usize> {
        self.sessions.peer_chains()
    }
}

/// Start a mock gateway that behaves per `mode` on every session.
pub async fn start_gateway(mode: GatewayMode) -> (Endpoint, GatewayLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
    let log = GatewayLog::default();
    let acceptor = acceptor();

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let log = server_log.clone();
            tokio::spawn(async move {
                let Ok(stream) = acceptor.accept(tcp).await else {
                    return;
                };
                log.sessions.record(&stream);
                serve_gateway(stream, log, mode).await;
            });
        }
    });

    (endpoint, log)
}

async fn serve_gateway(mut stream: TlsStream<TcpStream>, log: GatewayLog, mode: GatewayMode) {
    let mut received = 0;
    loop {
        // command, id, expiry, token length
        let mut head = [0u8; 11];
        if stream.read_exact(&mut head).await.is_err() {
            return;
        }
        let mut token = vec![0u8; usize::from(u16::from_be_bytes([head[9], head[10]]))];
        if stream.read_exact(&mut token).await.is_err() {
            return;
        }
        let mut json_len = [0u8; 2];
        if stream.read_exact(&mut json_len).await.is_err() {
            return;
        }
        let mut json = vec![0u8; usize::from(u16::from_be_bytes(json_len))];
        if stream.read_exact(&mut json).await.is_err() {
            return;
        }

        let mut raw = head.to_vec();
        raw.extend_from_slice(&token);
        raw.extend_from_slice(&json_len);
        raw.extend_from_slice(&json);

        let id = String::from_utf8_lossy(&head[1..5]).into_owned();
        log.frames.lock().push(ReceivedFrame {
            command: head[0],
            id: id.clone(),
            expiry: i32::from_ne_bytes([head[5], head[6], head[7], head[8]]),
            device_token: hex::encode(&token),
            json: String::from_utf8(json).unwrap(),
            raw,
        });

        received += 1;

        match mode {
            GatewayMode::Reject(reject_id, status) if id == reject_id => {
                let mut response = vec![8, status];
                response.extend_from_slice(reject_id.as_bytes());
                let _ = stream.write_all(&response).await;
                let _ = stream.flush().await;
                let _ = stream.shutdown().await;
                return;
            }
            GatewayMode::CloseAfter(limit) if received >= limit => {
                let _ = stream.shutdown().await;
                return;
            }
            _ => {}
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

/// Start a mock feedback service that writes `body` to every session and
/// then closes it.
pub async fn start_feedback(body: Vec<u8>) -> Endpoint {
    start_feedback_logged(body).await.0
}

pub async fn start_feedback_logged(body: Vec<u8>) -> (Endpoint, SessionLog) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = Endpoint::new("127.0.0.1", listener.local_addr().unwrap().port());
    let acceptor = acceptor();
    let log = SessionLog::default();
    let server_log = log.clone();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            let body = body.clone();
            let log = server_log.clone();
            tokio::spawn(async move {
                let Ok(mut stream) = acceptor.accept(tcp).await else {
                    return;
                };
                log.record(&stream);
                let _ = stream.write_all(&body).await;
                let _ = stream.flush().await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (endpoint, log)
}
