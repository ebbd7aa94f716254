//! Key material for the four algorithms a dep2p identity may be built on.
//!
//! Signature encoding is fixed per algorithm (raw `r ‖ s` for the two
//! elliptic-curve variants, PKCS#1 v1.5 for RSA, the standard 64-byte form
//! for Ed25519) so that verification only ever needs the algorithm tag and
//! the raw public key bytes — the same pair embedded in the TLS identity
//! extension and hashed into a `PeerId`.

use dep2p_types::KeyAlgorithm;
use ed25519_dalek::Signer as Ed25519Signer;
use k256::ecdsa::signature::Signer as EcdsaSigner;
use rand::rngs::OsRng;
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::signature::Signer as RsaSigner;
use sha2::Sha256;

use crate::error::{IdentityError, IdentityResult};

/// Owned private key material for one of the four supported algorithms.
pub enum KeyMaterial {
    Ed25519(ed25519_dalek::SigningKey),
    EcdsaP256(p256::ecdsa::SigningKey),
    Secp256k1(k256::ecdsa::SigningKey),
    Rsa(Box<rsa::RsaPrivateKey>),
}

impl KeyMaterial {
    pub fn algorithm(&self) -> KeyAlgorithm {
        match self {
            KeyMaterial::Ed25519(_) => KeyAlgorithm::Ed25519,
            KeyMaterial::EcdsaP256(_) => KeyAlgorithm::EcdsaP256,
            KeyMaterial::Secp256k1(_) => KeyAlgorithm::Secp256k1,
            KeyMaterial::Rsa(_) => KeyAlgorithm::Rsa,
        }
    }

    /// Raw public key bytes in the encoding this algorithm hashes into a
    /// `PeerId` and embeds in the TLS identity extension.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            KeyMaterial::Ed25519(key) => key.verifying_key().to_bytes().to_vec(),
            KeyMaterial::EcdsaP256(key) => {
                key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
            }
            KeyMaterial::Secp256k1(key) => {
                key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
            }
            KeyMaterial::Rsa(key) => rsa::pkcs1::EncodeRsaPublicKey::to_pkcs1_der(
                &rsa::RsaPublicKey::from(key.as_ref()),
            )
            .map(|der| der.as_bytes().to_vec())
            .unwrap_or_default(),
        }
    }

    pub fn sign(&self, message: &[u8]) -> IdentityResult<Vec<u8>> {
        match self {
            KeyMaterial::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
            KeyMaterial::EcdsaP256(key) => {
                let sig: p256::ecdsa::Signature = key.sign(message);
                Ok(sig.to_vec())
            }
            KeyMaterial::Secp256k1(key) => {
                let sig: k256::ecdsa::Signature = key.sign(message);
                Ok(sig.to_vec())
            }
            KeyMaterial::Rsa(key) => {
                let signing_key = RsaSigningKey::<Sha256>::new(key.as_ref().clone());
                let sig = signing_key.sign(message);
                Ok(rsa::signature::SignatureEncoding::to_vec(&sig))
            }
        }
    }

    pub fn generate_ed25519() -> Self {
        KeyMaterial::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm())
            .finish_non_exhaustive()
    }
}

pub fn verify(
    algorithm: KeyAlgorithm,
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> IdentityResult<()> {
    use rsa::signature::Verifier;

    match algorithm {
        KeyAlgorithm::Ed25519 => {
            let key_bytes: [u8; 32] = public_key
                .try_into()
                .map_err(|_| IdentityError::InvalidSignature)?;
            let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
                .map_err(|_| IdentityError::InvalidSignature)?;
            let sig_bytes: [u8; 64] = signature
                .try_into()
                .map_err(|_| IdentityError::InvalidSignature)?;
            let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
            verifying_key
                .verify_strict(message, &sig)
                .map_err(|_| IdentityError::InvalidSignature)
        }
        KeyAlgorithm::EcdsaP256 => {
            let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| IdentityError::InvalidSignature)?;
            let sig = p256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| IdentityError::InvalidSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| IdentityError::InvalidSignature)
        }
        KeyAlgorithm::Secp256k1 => {
            let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| IdentityError::InvalidSignature)?;
            let sig = k256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| IdentityError::InvalidSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| IdentityError::InvalidSignature)
        }
        KeyAlgorithm::Rsa => {
            let public_key = rsa::RsaPublicKey::try_from(
                rsa::pkcs1::DecodeRsaPublicKey::from_pkcs1_der(public_key)
                    .map_err(|_| IdentityError::InvalidSignature)?,
            )
            .unwrap_or_else(|_| unreachable!());
            let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key);
            let sig = rsa::pkcs1v15::Signature::try_from(signature)
                .map_err(|_| IdentityError::InvalidSignature)?;
            verifying_key
                .verify(message, &sig)
                .map_err(|_| IdentityError::InvalidSignature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_sign_and_verify_round_trips() {
        let key = KeyMaterial::generate_ed25519();
        let message = b"dep2p handshake payload";
        let signature = key.sign(message).unwrap();
        verify(key.algorithm(), &key.public_key_bytes(), message, &signature).unwrap();
    }

    #[test]
    fn ed25519_rejects_tampered_message() {
        let key = KeyMaterial::generate_ed25519();
        let signature = key.sign(b"original").unwrap();
        let result = verify(key.algorithm(), &key.public_key_bytes(), b"tampered", &signature);
        assert!(result.is_err());
    }
}
