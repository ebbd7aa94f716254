//! Errors raised while deriving TLS material or verifying peer certificates.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error("failed to build TLS configuration: {0}")]
    TlsConfig(String),

    #[error("failed to parse peer certificate: {0}")]
    CertParse(String),

    #[error("peer certificate is missing the dep2p identity extension")]
    MissingIdentityExtension,

    #[error("peer certificate identity extension is malformed")]
    MalformedIdentityExtension,

    #[error("peer certificate validity period check failed: {0}")]
    Validity(String),
}

pub type SecurityResult<T> = Result<T, SecurityError>;
