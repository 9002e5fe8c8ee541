//! Client certificate material and the TLS client configuration built from it.
//!
//! The gateway authenticates the client by certificate. The server's own
//! certificate chain is not validated; handshake signatures still are.

use std::path::Path;
use std::sync::Arc;

use openssl::pkcs12::Pkcs12;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::TransportError;

/// Client certificate chain and private key taken from a PKCS#12 bundle.
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    fingerprint: String,
}

impl ClientIdentity {
    /// Parse a DER-encoded PKCS#12 bundle. An empty passphrase opens an
    /// unprotected bundle.
    pub fn from_pkcs12(der: &[u8], passphrase: &SecretString) -> Result<Self, TransportError> {
        let parsed = Pkcs12::from_der(der)?.parse2(passphrase.expose_secret())?;

        let pkey = parsed
            .pkey
            .ok_or_else(|| TransportError::certificate("bundle has no private key"))?;
        let cert = parsed
            .cert
            .ok_or_else(|| TransportError::certificate("bundle has no certificate"))?;

        let leaf = CertificateDer::from(cert.to_der()?);
        let fingerprint = format!("sha256:{}", hex::encode(Sha256::digest(leaf.as_ref())));

        let mut chain = vec![leaf];
        if let Some(cas) = parsed.ca {
            for ca in cas.iter() {
                chain.push(CertificateDer::from(ca.to_der()?));
            }
        }

        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(pkey.private_key_to_pkcs8()?));

        Ok(Self {
            chain,
            key,
            fingerprint,
        })
    }

    pub fn from_pkcs12_file(
        path: impl AsRef<Path>,
        passphrase: &SecretString,
    ) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let der = std::fs::read(path).map_err(|e| {
            TransportError::certificate(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_pkcs12(&der, passphrase)
    }

    /// SHA-256 of the leaf certificate, `"sha256:<hex>"`.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Number of certificates presented during the handshake.
    pub fn chain_len(&self) -> usize {
        self.chain.len()
    }

    /// Build the TLS client configuration, consuming the key material.
    pub fn into_tls_config(self) -> Result<Arc<ClientConfig>, TransportError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = Arc::new(AcceptAnyServerCert {
            algorithms: provider.signature_verification_algorithms,
        });

        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_client_auth_cert(self.chain, self.key)?;

        Ok(Arc::new(config))
    }
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("fingerprint", &self.fingerprint)
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Accepts any server certificate chain and host name.
#[derive(Debug)]
struct AcceptAnyServerCert {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
