//! Builds the rustls/quinn configuration pair every `Transport` needs:
//! TLS 1.3 only, mutual authentication, a fixed `dep2p` ALPN token, and the
//! peer-id verifiers from [`crate::verifier`] in place of normal chain
//! validation.

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};
use rustls::version::TLS13;

use crate::cert::{CertifiedKey, ALPN_PROTOCOL};
use crate::error::{SecurityError, SecurityResult};
use crate::verifier::{PeerIdClientVerifier, PeerIdServerVerifier};

fn cert_chain(cert_der: &[u8]) -> Vec<CertificateDer<'static>> {
    vec![CertificateDer::from(cert_der.to_vec())]
}

fn private_key(key_der: &[u8]) -> rustls::pki_types::PrivateKeyDer<'static> {
    rustls::pki_types::PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der.to_vec()))
}

/// Build the server-side rustls config for a listener: requires and
/// verifies a client certificate via peer-id derivation.
pub fn build_server_config(certified: &CertifiedKey) -> SecurityResult<rustls::ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PeerIdClientVerifier::new(provider);

    let mut config = rustls::ServerConfig::builder_with_protocol_versions(&[&TLS13])
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain(&certified.cert_der), private_key(&certified.key_der))
        .map_err(|e| SecurityError::TlsConfig(e.to_string()))?;

    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// Build the client-side rustls config for dialing: presents the same
/// identity certificate as client auth and verifies the server's
/// certificate via peer-id derivation instead of a hostname/CA check.
pub fn build_client_config(certified: &CertifiedKey) -> SecurityResult<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = PeerIdServerVerifier::new(provider);

    let mut config = rustls::ClientConfig::builder_with_protocol_versions(&[&TLS13])
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_client_auth_cert(cert_chain(&certified.cert_der), private_key(&certified.key_der))
        .map_err(|e| SecurityError::TlsConfig(e.to_string()))?;

    config.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];
    Ok(config)
}

/// Bridge a server rustls config into the quinn-native server config, with
/// the transport's `MaxIdleTimeout`/`KeepAlivePeriod`/0-RTT settings applied
/// by the caller on the returned `TransportConfig`.
pub fn build_quinn_server_config(
    certified: &CertifiedKey,
) -> SecurityResult<quinn::ServerConfig> {
    let rustls_config = build_server_config(certified)?;
    let quic_config = quinn::crypto::rustls::QuicServerConfig::try_from(rustls_config)
        .map_err(|e| SecurityError::TlsConfig(e.to_string()))?;
    Ok(quinn::ServerConfig::with_crypto(Arc::new(quic_config)))
}

/// Bridge a client rustls config into the quinn-native client config.
pub fn build_quinn_client_config(
    certified: &CertifiedKey,
) -> SecurityResult<quinn::ClientConfig> {
    let rustls_config = build_client_config(certified)?;
    let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from(rustls_config)
        .map_err(|e| SecurityError::TlsConfig(e.to_string()))?;
    Ok(quinn::ClientConfig::new(Arc::new(quic_config)))
}
