//! Push client: the public entry point.
//!
//! Holds the configuration and the TLS client configuration built once from
//! the client certificate. Every call opens its own sessions, so one client
//! can be shared across tasks.

use std::path::Path;
use std::sync::Arc;

use apns_protocol::{FeedbackEntry, Payload};
use secrecy::SecretString;
use tracing::info;

use crate::config::PushConfig;
use crate::error::TransportError;
use crate::feedback::FeedbackReader;
use crate::identity::ClientIdentity;
use crate::sender::{BatchReport, BatchSender};

#[derive(Clone)]
pub struct PushClient {
    config: PushConfig,
    tls: Arc<rustls::ClientConfig>,
}

impl PushClient {
    pub fn new(config: PushConfig, identity: ClientIdentity) -> Result<Self, TransportError> {
        info!(
            "Client certificate loaded ({}, {} in chain)",
            identity.fingerprint(),
            identity.chain_len()
        );
        let tls = identity.into_tls_config()?;
        Ok(Self { config, tls })
    }

    /// Client for the sandbox or production gateways from a DER PKCS#12 bundle.
    pub fn from_pkcs12(
        use_sandbox: bool,
        bundle: &[u8],
        passphrase: &SecretString,
    ) -> Result<Self, TransportError> {
        let identity = ClientIdentity::from_pkcs12(bundle, passphrase)?;
        Self::new(PushConfig::for_environment(use_sandbox), identity)
    }

    pub fn from_pkcs12_file(
        use_sandbox: bool,
        path: impl AsRef<Path>,
        passphrase: &SecretString,
    ) -> Result<Self, TransportError> {
        let identity = ClientIdentity::from_pkcs12_file(path, passphrase)?;
        Self::new(PushConfig::for_environment(use_sandbox), identity)
    }

    pub fn config(&self) -> &PushConfig {
        &self.config
    }

    /// Send `payloads` and return the device tokens the gateway rejected.
    pub async fn send_batch(&self, payloads: &[Payload]) -> Vec<String> {
        self.send_batch_report(payloads).await.rejected
    }

    /// Like [`send_batch`](Self::send_batch) with the full counters.
    pub async fn send_batch_report(&self, payloads: &[Payload]) -> BatchReport {
        BatchSender::new(self.tls.clone(), self.config.clone())
            .send(payloads)
            .await
    }

    /// Read the feedback service. Fails as a whole on any stream error.
    pub async fn fetch_feedback(&self) -> Result<Vec<FeedbackEntry>, TransportError> {
        FeedbackReader::new(self.tls.clone(), &self.config).fetch().await
    }
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
