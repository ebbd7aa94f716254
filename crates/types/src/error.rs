//! Error types shared by the rest of the workspace.

use thiserror::Error;

/// Errors raised while parsing or validating a [`crate::Multiaddr`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultiaddrError {
    #[error("invalid multiaddr: {0}")]
    InvalidAddress(String),

    #[error("unsupported protocol suffix in multiaddr: {0}")]
    UnsupportedProtocol(String),
}

/// Result alias for this crate's fallible operations.
pub type TypesResult<T> = Result<T, MultiaddrError>;
