//! TLS material and peer-identity verification for the dep2p transport.
//!
//! This crate owns everything between "an identity's raw public key" and
//! "a quinn client/server config ready to hand to the QUIC endpoint":
//! self-signed certificate generation with the embedded peer-identity
//! extension ([`cert`]), the custom rustls verifiers that turn certificate
//! validation into peer-id derivation ([`verifier`]), and the config
//! builders that wire both together with TLS 1.3 and the `dep2p` ALPN
//! token ([`config`]).

pub mod cert;
pub mod config;
pub mod error;
pub mod verifier;

pub use cert::{
    extract_peer_identity, generate_identity_cert, CertifiedKey, PeerIdentity,
    ALPN_PROTOCOL, PEER_ID_EXTENSION_OID,
};
pub use config::{
    build_client_config, build_quinn_client_config, build_quinn_server_config,
    build_server_config,
};
pub use error::{SecurityError, SecurityResult};
pub use verifier::{PeerIdClientVerifier, PeerIdServerVerifier};
