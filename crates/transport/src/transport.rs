//! The transport core: a single QUIC endpoint shared between listening and
//! dialing over one UDP socket, so inbound and outbound traffic for a peer
//! always look like they come from the same address — the property NAT
//! hole-punching and connection migration both depend on.

use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::sync::{Arc, RwLock};

use dep2p_identity::Identity;
use dep2p_types::{Multiaddr, PeerId};
use tracing::{debug, info};

use crate::config::TransportConfig;
use crate::connection::{Connection, Direction};
use crate::error::{TransportError, TransportResult};
use crate::listener::{remote_peer_id, Listener};
use crate::migration::MigrationMonitor;
use crate::session_cache::SessionCache;

const SERVER_NAME: &str = "dep2p.local";

/// The slot a `Transport` and every `Listener` it has issued share. Kept
/// behind its own `Arc` (distinct from the `Arc<Transport>` handle itself)
/// so a `Listener` outlives neither a `Transport` clone nor a rebind: it
/// always sees whatever endpoint currently lives in the slot.
pub(crate) type SharedEndpoint = Arc<RwLock<Option<quinn::Endpoint>>>;

/// Owns the shared QUIC endpoint, the per-transport 0-RTT session cache,
/// and the migration monitor. Cloning a `Transport` handle is cheap; the
/// endpoint itself lives behind a write-locked `Option` so `rebind` and
/// `close` can swap or tear it down without racing a concurrent `dial`.
///
/// The endpoint is bound lazily: neither `Transport::new` nor construction
/// touches a socket. The first call to `listen` or `dial` binds it; every
/// call after that reuses the same socket.
pub struct Transport {
    identity: Arc<Identity>,
    config: TransportConfig,
    endpoint: SharedEndpoint,
    session_cache: Arc<SessionCache>,
    migration: Arc<MigrationMonitor>,
}

impl Transport {
    pub fn new(identity: Arc<Identity>, config: TransportConfig) -> TransportResult<Arc<Self>> {
        let session_cache = SessionCache::new(config.session_cache.clone());
        let migration = MigrationMonitor::new(config.migration.clone());

        let transport = Arc::new(Self {
            identity,
            config,
            endpoint: Arc::new(RwLock::new(None)),
            session_cache,
            migration,
        });

        transport.migration.start();
        Ok(transport)
    }

    fn build_endpoint(
        identity: &Identity,
        config: &TransportConfig,
        bind_addr: SocketAddr,
    ) -> TransportResult<quinn::Endpoint> {
        let socket = StdUdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;

        let mut server_config = identity.quinn_server_config()?;
        let mut client_config = identity.quinn_client_config()?;

        let mut transport_config = quinn::TransportConfig::default();
        transport_config
            .max_idle_timeout(Some(
                config
                    .max_idle_timeout
                    .try_into()
                    .map_err(|_| TransportError::HandshakeFailed("invalid max idle timeout".into()))?,
            ))
            .keep_alive_interval(Some(config.keep_alive_period))
            .max_concurrent_bidi_streams(config.max_incoming_streams.into())
            .max_concurrent_uni_streams(config.max_incoming_uni_streams.into());
        let transport_config = Arc::new(transport_config);

        server_config.transport_config(Arc::clone(&transport_config));
        if !config.enable_0rtt {
            server_config.use_retry(true);
        }
        client_config.transport_config(transport_config);

        let endpoint_config = quinn::EndpointConfig::default();
        let runtime = quinn::default_runtime()
            .ok_or_else(|| TransportError::HandshakeFailed("no async runtime available".into()))?;

        let mut endpoint = quinn::Endpoint::new(endpoint_config, Some(server_config), socket, runtime)
            .map_err(TransportError::BindFailed)?;
        endpoint.set_default_client_config(client_config);

        Ok(endpoint)
    }

    /// Returns the current endpoint, binding one on `bind_addr` first if the
    /// slot is still empty. Double-checked so two concurrent first callers
    /// (one `listen`, one `dial`) can't both bind and silently drop a socket.
    fn ensure_endpoint(&self, bind_addr: SocketAddr) -> TransportResult<quinn::Endpoint> {
        {
            let guard = self.endpoint.read().expect("transport endpoint lock poisoned");
            if let Some(endpoint) = guard.as_ref() {
                return Ok(endpoint.clone());
            }
        }
        let mut guard = self.endpoint.write().expect("transport endpoint lock poisoned");
        if let Some(endpoint) = guard.as_ref() {
            return Ok(endpoint.clone());
        }
        let endpoint = Self::build_endpoint(&self.identity, &self.config, bind_addr)?;
        *guard = Some(endpoint.clone());
        Ok(endpoint)
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }

    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.session_cache
    }

    pub fn migration(&self) -> &Arc<MigrationMonitor> {
        &self.migration
    }

    pub fn protocols(&self) -> &'static [&'static str] {
        &["/quic-v1"]
    }

    pub fn can_dial(&self, addr: &Multiaddr) -> bool {
        self.config.enable_quic && addr.can_dial() && addr.to_socket_addr().is_some()
    }

    pub fn local_multiaddr(&self) -> TransportResult<Multiaddr> {
        let guard = self.endpoint.read().expect("transport endpoint lock poisoned");
        let endpoint = guard.as_ref().ok_or(TransportError::TransportClosed)?;
        endpoint
            .local_addr()
            .map(Multiaddr::from_socket_addr_quic)
            .map_err(TransportError::BindFailed)
    }

    /// Bind (on first call) or reuse (on every call after) a `Listener` on
    /// `local_multiaddr`. Rejects anything that isn't a dialable QUIC
    /// multiaddr without touching the socket.
    pub fn listen(&self, local_multiaddr: &Multiaddr) -> TransportResult<Listener> {
        if !self.config.enable_quic || !local_multiaddr.can_dial() {
            return Err(TransportError::InvalidAddress(local_multiaddr.to_string()));
        }
        let bind_addr = local_multiaddr
            .to_socket_addr()
            .ok_or_else(|| TransportError::InvalidAddress(local_multiaddr.to_string()))?;

        self.ensure_endpoint(bind_addr)?;
        info!(addr = %local_multiaddr, "transport listening");
        Ok(Listener::new(Arc::clone(&self.endpoint), self.local_peer_id()))
    }

    /// Dial a peer at the given multiaddr. Returns `NotDialable` without
    /// touching the network if the address isn't a QUIC address this
    /// transport understands. When `expected_peer_id` is `Some`, the
    /// connection is rejected with `PeerIdMismatch` if the peer presented by
    /// the handshake doesn't match; pass `None` when the caller doesn't know
    /// the remote identity ahead of time (e.g. dialing a rendezvous point by
    /// address alone).
    pub async fn dial(&self, addr: &Multiaddr, expected_peer_id: Option<PeerId>) -> TransportResult<Connection> {
        if !self.can_dial(addr) {
            return Err(TransportError::NotDialable(addr.to_string()));
        }
        let socket_addr = addr
            .to_socket_addr()
            .ok_or_else(|| TransportError::NotDialable(addr.to_string()))?;

        let bind_addr: SocketAddr = if socket_addr.is_ipv6() {
            "[::]:0".parse().expect("valid socket addr")
        } else {
            "0.0.0.0:0".parse().expect("valid socket addr")
        };
        let endpoint = self.ensure_endpoint(bind_addr)?;

        let connecting = endpoint.connect(socket_addr, SERVER_NAME)?;
        let conn = tokio::time::timeout(self.config.dial_timeout, connecting)
            .await
            .map_err(|_| TransportError::DialTimeout)??;

        let peer_id = remote_peer_id(&conn)?;
        if let Some(expected) = expected_peer_id {
            if peer_id != expected {
                conn.close(1u32.into(), b"peer id mismatch");
                return Err(TransportError::PeerIdMismatch { expected, actual: peer_id });
            }
        }

        let local_addr = endpoint
            .local_addr()
            .map(Multiaddr::from_socket_addr_quic)
            .map_err(TransportError::BindFailed)?;

        debug!(peer = %peer_id, addr = %addr, "dialed peer");
        Ok(Connection::new(conn, self.local_peer_id(), local_addr, peer_id, Direction::Outbound))
    }

    /// Close the transport's endpoint and stop background tasks.
    /// Idempotent: closing an already-closed transport is a no-op.
    pub fn close(&self) {
        let mut guard = self.endpoint.write().expect("transport endpoint lock poisoned");
        if let Some(endpoint) = guard.take() {
            endpoint.close(0u32.into(), b"transport closed");
        }
        self.migration.stop();
    }

    pub fn is_closed(&self) -> bool {
        self.endpoint.read().expect("transport endpoint lock poisoned").is_none()
    }

    /// Rebuild the endpoint on a new local address, preserving identity and
    /// configuration. Used after a migration event to move off an address
    /// that's gone away. Every `Listener` previously issued by this
    /// transport shares the same slot, so it keeps accepting on the new
    /// endpoint without needing to be reissued.
    pub fn rebind(&self, bind_addr: SocketAddr) -> TransportResult<()> {
        let new_endpoint = Self::build_endpoint(&self.identity, &self.config, bind_addr)?;
        let mut guard = self.endpoint.write().expect("transport endpoint lock poisoned");
        if let Some(old) = guard.take() {
            old.close(0u32.into(), b"rebinding");
        }
        *guard = Some(new_endpoint);
        info!(addr = %bind_addr, "transport rebound");
        Ok(())
    }
}
