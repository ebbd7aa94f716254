//! Self-signed certificate generation and the dep2p peer-identity extension.
//!
//! The TLS handshake itself is carried by a fresh, per-transport Ed25519
//! "carrier" keypair — rcgen (and X.509/TLS generally) has no signature
//! algorithm for secp256k1, so a dep2p identity built on that curve could
//! never sign its own certificate directly. Instead every certificate,
//! regardless of the owning identity's key algorithm, is self-signed by the
//! carrier key, and the *real* identity public key travels in a custom
//! certificate extension under a well-known OID. A peer is authenticated not
//! by validating a certificate chain but by successfully deriving a
//! `PeerId` from that embedded key — exactly the "peer-id-from-public-key"
//! validation the transport's verifier performs.

use dep2p_types::{KeyAlgorithm, PeerId};
use rcgen::{CertificateParams, CustomExtension, KeyPair, PKCS_ED25519};

use crate::error::{SecurityError, SecurityResult};

/// `1.3.6.1.4.1.<pen>.1.1` — a private-enterprise-number arc reserved for
/// this project's peer-identity extension. The PEN value itself is
/// arbitrary; only its stability across encode/decode matters.
pub const PEER_ID_EXTENSION_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 53594, 1, 1];

/// ALPN token negotiated on every dep2p QUIC connection.
pub const ALPN_PROTOCOL: &[u8] = b"dep2p";

/// A self-signed certificate plus the PKCS8 DER of the carrier key that
/// signed it, ready to hand to `rustls`.
pub struct CertifiedKey {
    pub cert_der: Vec<u8>,
    pub key_der: Vec<u8>,
}

/// Generate a fresh self-signed certificate embedding `public_key` (tagged
/// with `algorithm`) in the dep2p identity extension.
pub fn generate_identity_cert(
    algorithm: KeyAlgorithm,
    public_key: &[u8],
) -> SecurityResult<CertifiedKey> {
    let carrier_key = KeyPair::generate_for(&PKCS_ED25519)
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    let mut params = CertificateParams::new(vec!["dep2p.local".to_string()])
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    let mut extension_value = Vec::with_capacity(1 + public_key.len());
    extension_value.push(algorithm.tag());
    extension_value.extend_from_slice(public_key);
    params
        .custom_extensions
        .push(CustomExtension::from_oid_content(
            PEER_ID_EXTENSION_OID,
            extension_value,
        ));

    let cert = params
        .self_signed(&carrier_key)
        .map_err(|e| SecurityError::CertGeneration(e.to_string()))?;

    Ok(CertifiedKey {
        cert_der: cert.der().to_vec(),
        key_der: carrier_key.serialize_der(),
    })
}

/// The identity recovered from a peer's certificate.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub algorithm: KeyAlgorithm,
    pub public_key: Vec<u8>,
    pub peer_id: PeerId,
}

/// Parse a peer's DER certificate, check its validity window, and derive a
/// `PeerId` from the embedded identity extension.
///
/// This is the entire trust decision for a dep2p peer: there is no
/// certificate-chain or hostname validation, only "does this certificate
/// carry a well-formed public key we can hash into a `PeerId`".
pub fn extract_peer_identity(cert_der: &[u8]) -> SecurityResult<PeerIdentity> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| SecurityError::CertParse(e.to_string()))?;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| SecurityError::Validity(e.to_string()))?
        .as_secs() as i64;

    if now < cert.validity().not_before.timestamp() {
        return Err(SecurityError::Validity("certificate not yet valid".into()));
    }
    if now > cert.validity().not_after.timestamp() {
        return Err(SecurityError::Validity("certificate expired".into()));
    }

    let expected_oid = oid_registry::Oid::from(PEER_ID_EXTENSION_OID)
        .map_err(|_| SecurityError::MalformedIdentityExtension)?;

    let extension = cert
        .extensions()
        .iter()
        .find(|ext| ext.oid == expected_oid)
        .ok_or(SecurityError::MissingIdentityExtension)?;

    let value = extension.value;
    if value.is_empty() {
        return Err(SecurityError::MalformedIdentityExtension);
    }

    let algorithm =
        KeyAlgorithm::from_tag(value[0]).ok_or(SecurityError::MalformedIdentityExtension)?;
    let public_key = value[1..].to_vec();
    if public_key.is_empty() {
        return Err(SecurityError::MalformedIdentityExtension);
    }

    let peer_id = PeerId::from_public_key(algorithm, &public_key);
    Ok(PeerIdentity {
        algorithm,
        public_key,
        peer_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_cert_with_recoverable_identity() {
        let public_key = b"a-fake-ed25519-public-key-32byte";
        let certified = generate_identity_cert(KeyAlgorithm::Ed25519, public_key).unwrap();

        let identity = extract_peer_identity(&certified.cert_der).unwrap();
        assert_eq!(identity.algorithm, KeyAlgorithm::Ed25519);
        assert_eq!(identity.public_key, public_key);
        assert_eq!(
            identity.peer_id,
            PeerId::from_public_key(KeyAlgorithm::Ed25519, public_key)
        );
    }

    #[test]
    fn rejects_certificate_without_extension() {
        let carrier_key = KeyPair::generate_for(&PKCS_ED25519).unwrap();
        let params = CertificateParams::new(vec!["no-extension.local".to_string()]).unwrap();
        let cert = params.self_signed(&carrier_key).unwrap();

        let err = extract_peer_identity(cert.der()).unwrap_err();
        assert!(matches!(err, SecurityError::MissingIdentityExtension));
    }
}
