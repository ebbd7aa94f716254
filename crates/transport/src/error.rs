//! Errors surfaced by the transport core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is closed")]
    TransportClosed,

    #[error("listener is closed")]
    ListenerClosed,

    #[error("connection is closed")]
    ConnectionClosed,

    #[error("peer id mismatch: expected {expected}, got {actual}")]
    PeerIdMismatch {
        expected: dep2p_types::PeerId,
        actual: dep2p_types::PeerId,
    },

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("dial timed out")]
    DialTimeout,

    #[error("address cannot be dialed: {0}")]
    NotDialable(String),

    #[error("address is not a valid listen address: {0}")]
    InvalidAddress(String),

    #[error("failed to bind socket: {0}")]
    BindFailed(#[from] std::io::Error),

    #[error("stream error: {0}")]
    Stream(String),

    #[error(transparent)]
    Identity(#[from] dep2p_identity::IdentityError),

    #[error(transparent)]
    Security(#[from] dep2p_security::SecurityError),

    #[error("quic connect failed: {0}")]
    Connect(#[from] quinn::ConnectError),

    #[error("quic connection failed: {0}")]
    Connection(#[from] quinn::ConnectionError),
}

pub type TransportResult<T> = Result<T, TransportError>;
