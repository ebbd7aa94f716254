//! A dep2p identity: a keypair under one of four supported algorithms,
//! the `PeerId` it derives, and the TLS material built from it.
//!
//! Key generation and on-disk persistence of identities are out of scope
//! for this core (see spec Non-goals); this crate only wraps already
//! in-memory key material, generating a fresh carrier certificate whenever
//! a connection-ready TLS config is requested.

pub mod error;
pub mod key;

use dep2p_security::{build_quinn_client_config, build_quinn_server_config, generate_identity_cert};
use dep2p_types::PeerId;

pub use error::{IdentityError, IdentityResult};
pub use key::KeyMaterial;

/// A local identity: private key material plus the derived `PeerId`.
pub struct Identity {
    key: KeyMaterial,
    peer_id: PeerId,
}

impl Identity {
    /// Wrap already-generated key material into an identity, deriving its
    /// `PeerId` from the public key.
    pub fn from_keypair(key: KeyMaterial) -> Self {
        let peer_id = PeerId::from_public_key(key.algorithm(), &key.public_key_bytes());
        Self { key, peer_id }
    }

    /// Generate a fresh Ed25519 identity. Intended for tests and examples;
    /// production identities are expected to come from `from_keypair` with
    /// key material sourced outside this core.
    pub fn generate_ed25519() -> Self {
        Self::from_keypair(KeyMaterial::generate_ed25519())
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn algorithm(&self) -> dep2p_types::KeyAlgorithm {
        self.key.algorithm()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.key.public_key_bytes()
    }

    pub fn sign(&self, message: &[u8]) -> IdentityResult<Vec<u8>> {
        self.key.sign(message)
    }

    /// Build a fresh quinn server config bound to this identity: a new
    /// carrier certificate embedding this identity's public key, wrapped in
    /// rustls/quinn TLS 1.3 mutual-auth configuration.
    pub fn quinn_server_config(&self) -> IdentityResult<quinn::ServerConfig> {
        let certified = generate_identity_cert(self.key.algorithm(), &self.key.public_key_bytes())?;
        Ok(build_quinn_server_config(&certified)?)
    }

    /// Build a fresh quinn client config bound to this identity.
    pub fn quinn_client_config(&self) -> IdentityResult<quinn::ClientConfig> {
        let certified = generate_identity_cert(self.key.algorithm(), &self.key.public_key_bytes())?;
        Ok(build_quinn_client_config(&certified)?)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity").field("peer_id", &self.peer_id).finish()
    }
}

/// Verify a signature produced by [`Identity::sign`] against a peer's
/// advertised algorithm and public key.
pub fn verify_signature(
    algorithm: dep2p_types::KeyAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> IdentityResult<()> {
    key::verify(algorithm, public_key, message, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_peer_id_matches_public_key_derivation() {
        let identity = Identity::generate_ed25519();
        let expected = PeerId::from_public_key(
            dep2p_types::KeyAlgorithm::Ed25519,
            &identity.public_key_bytes(),
        );
        assert_eq!(identity.peer_id(), expected);
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let identity = Identity::generate_ed25519();
        let message = b"rendezvous register payload";
        let signature = identity.sign(message).unwrap();
        verify_signature(
            dep2p_types::KeyAlgorithm::Ed25519,
            &identity.public_key_bytes(),
            message,
            &signature,
        )
        .unwrap();
    }
}
