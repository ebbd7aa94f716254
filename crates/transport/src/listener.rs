//! Accepts inbound QUIC connections on a transport's shared endpoint.

use dep2p_types::{Multiaddr, PeerId};
use tracing::warn;

use crate::connection::{Connection, Direction};
use crate::error::{TransportError, TransportResult};
use crate::transport::SharedEndpoint;

/// Extract the peer identity from a freshly-established quinn connection's
/// peer certificate chain.
pub(crate) fn remote_peer_id(conn: &quinn::Connection) -> TransportResult<PeerId> {
    let identity = conn
        .peer_identity()
        .and_then(|identity| identity.downcast::<Vec<rustls::pki_types::CertificateDer<'static>>>().ok())
        .ok_or_else(|| TransportError::HandshakeFailed("no peer certificate presented".into()))?;

    let cert = identity
        .first()
        .ok_or_else(|| TransportError::HandshakeFailed("empty peer certificate chain".into()))?;

    let peer_identity = dep2p_security::extract_peer_identity(cert.as_ref())?;
    Ok(peer_identity.peer_id)
}

/// Accepts inbound connections over a transport's shared QUIC endpoint.
///
/// Holds the same `SharedEndpoint` slot as the `Transport` that issued it,
/// rather than a snapshot of one `quinn::Endpoint`, so a `Transport::rebind`
/// after this `Listener` was created redirects it instead of killing it.
pub struct Listener {
    endpoint: SharedEndpoint,
    local_peer_id: PeerId,
}

impl Listener {
    pub(crate) fn new(endpoint: SharedEndpoint, local_peer_id: PeerId) -> Self {
        Self { endpoint, local_peer_id }
    }

    pub fn local_multiaddr(&self) -> TransportResult<Multiaddr> {
        let guard = self.endpoint.read().expect("transport endpoint lock poisoned");
        let endpoint = guard.as_ref().ok_or(TransportError::ListenerClosed)?;
        endpoint
            .local_addr()
            .map(Multiaddr::from_socket_addr_quic)
            .map_err(TransportError::BindFailed)
    }

    /// Accept the next inbound connection whose handshake completes and
    /// whose peer certificate yields a valid peer id. Connections that fail
    /// either check are logged and skipped, not surfaced as errors, so one
    /// bad dialer can't wedge every other caller's `accept()`.
    pub async fn accept(&self) -> TransportResult<Connection> {
        loop {
            let endpoint = {
                let guard = self.endpoint.read().expect("transport endpoint lock poisoned");
                guard.as_ref().ok_or(TransportError::ListenerClosed)?.clone()
            };

            let incoming = match endpoint.accept().await {
                Some(incoming) => incoming,
                None => {
                    // This particular endpoint instance stopped accepting.
                    // That happens both when the transport is closed for
                    // good and when `rebind` swapped in a fresh endpoint
                    // out from under us. Re-read the shared slot: only a
                    // genuinely empty slot means we're done.
                    let still_live = self.endpoint.read().expect("transport endpoint lock poisoned").is_some();
                    if still_live {
                        continue;
                    }
                    return Err(TransportError::ListenerClosed);
                }
            };

            let connecting = match incoming.accept() {
                Ok(connecting) => connecting,
                Err(err) => {
                    warn!(error = %err, "failed to accept incoming connection");
                    continue;
                }
            };

            match connecting.await {
                Ok(conn) => match remote_peer_id(&conn) {
                    Ok(peer_id) => {
                        let local_addr = endpoint
                            .local_addr()
                            .map(Multiaddr::from_socket_addr_quic)
                            .map_err(TransportError::BindFailed)?;
                        return Ok(Connection::new(conn, self.local_peer_id, local_addr, peer_id, Direction::Inbound));
                    }
                    Err(err) => {
                        warn!(error = %err, "rejecting peer with invalid identity");
                        conn.close(1u32.into(), b"invalid peer identity");
                        continue;
                    }
                },
                Err(err) => {
                    warn!(error = %err, "quic handshake failed");
                    continue;
                }
            }
        }
    }
}
