//! Errors raised while generating, signing with, or deriving TLS material
//! from a dep2p identity.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("unsupported key algorithm")]
    UnsupportedAlgorithm,

    #[error(transparent)]
    Security(#[from] dep2p_security::SecurityError),
}

pub type IdentityResult<T> = Result<T, IdentityError>;
