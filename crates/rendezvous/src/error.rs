//! Error types for the rendezvous wire protocol, store, and client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame exceeds maximum size of {max} bytes: got {got}")]
    FrameTooLarge { max: usize, got: usize },

    #[error("frame was truncated")]
    Truncated,

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("failed to decode message: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("signed record is truncated or malformed")]
    Malformed,

    #[error("unknown key algorithm tag {0}")]
    UnknownAlgorithm(u8),

    #[error("record carries {got} addresses, more than the maximum of {max}")]
    TooManyAddresses { max: usize, got: usize },

    #[error(transparent)]
    Identity(#[from] dep2p_identity::IdentityError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("namespace {0:?} not found")]
    NamespaceNotFound(String),

    #[error("registration not found for this peer in this namespace")]
    RegistrationNotFound,

    #[error("registration quota exceeded: {0}")]
    QuotaExceeded(&'static str),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Storage(#[from] dep2p_storage::StorageError),
}

#[derive(Debug, Error)]
pub enum DiscovererError {
    #[error("no rendezvous points are configured")]
    NoPoints,

    #[error("every rendezvous point is unhealthy")]
    AllPointsUnhealthy,

    #[error("rendezvous point rejected the request: {0:?}")]
    Rejected(crate::wire::StatusCode),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Transport(#[from] dep2p_transport::TransportError),
}

#[derive(Debug, Error)]
pub enum RendezvousError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] dep2p_transport::TransportError),
}
