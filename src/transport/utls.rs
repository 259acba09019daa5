//! Shared TLS policy, plus the JA3/parrot selection surface (§4.3, §4.8).
//!
//! Actual fingerprint mimicry (rewriting the ClientHello to match a JA3
//! string or a named browser parrot) is out of scope here; what this
//! module owns is the *selection* — JA3 beats parrot, either beats plain
//! protocol dispatch — and the single TLS policy every engine shares:
//! certificate validation is off by design, and the cipher suite list is
//! pinned to the one named AEAD suite that rustls actually implements.

use super::{RoundTripper, TransportSettings};
use crate::error::TransportError;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;

/// `ECDHE-RSA-AES256-GCM-SHA384`. `ECDHE-RSA-AES256-CBC-SHA` is named
/// elsewhere in the fingerprint tables this crate draws from, but
/// rustls only ever implements TLS 1.2 AEAD suites, never the legacy
/// CBC-HMAC ones — a capability gap, not a design choice.
fn cipher_suites() -> Vec<rustls::SupportedCipherSuite> {
    vec![rustls::crypto::ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384]
}

#[derive(Debug)]
struct AcceptAnyCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCert {
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
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// The `rustls::ClientConfig` every TLS-backed engine is built from:
/// certificate validation disabled, cipher suites pinned to the single
/// AEAD suite available, minimum protocol version 1.2.
pub fn base_tls_config() -> ClientConfig {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut restricted = CryptoProvider {
        cipher_suites: cipher_suites(),
        ..(*provider).clone()
    };
    restricted.cipher_suites = cipher_suites();
    let provider = Arc::new(restricted);

    ClientConfig::builder_with_provider(provider.clone())
        .with_protocol_versions(&[&rustls::version::TLS12])
        .expect("TLS12 is a supported protocol version for the pinned suite")
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert(provider)))
        .with_no_client_auth()
}

/// Build the round-tripper named by a JA3 string or parrot label. The
/// fingerprint is recorded for `Get("ja3")`/`Get("parrot")` but the
/// underlying engine is always the plain TLS-backed HTTP/1.1 client —
/// see the module doc comment for why.
pub fn build(settings: &TransportSettings) -> Result<Arc<dyn RoundTripper>, TransportError> {
    super::http1::build(settings, true)
}
