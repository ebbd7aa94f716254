//! The rendezvous point server: accepts connections over a transport
//! listener and dispatches each stream's request against a [`Store`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dep2p_transport::{Connection, Listener, Stream};
use tracing::{debug, warn};

use crate::store::Store;
use crate::wire::{read_message, write_message, RegistrationView, RendezvousMessage, StatusCode};

const MAX_NAMESPACE_LEN: usize = 255;

#[derive(Debug, Clone)]
pub struct PointConfig {
    pub cleanup_interval: Duration,
}

impl Default for PointConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Default)]
pub struct PointStats {
    pub registrations_total: u64,
    pub unregistrations_total: u64,
    pub discoveries_total: u64,
    pub rejections_total: u64,
}

struct Counters {
    registrations_total: AtomicU64,
    unregistrations_total: AtomicU64,
    discoveries_total: AtomicU64,
    rejections_total: AtomicU64,
}

/// A running rendezvous service: accepts connections on `listener` and
/// serves register/unregister/discover requests against `store`.
pub struct Point {
    store: Arc<Store>,
    listener: Listener,
    config: PointConfig,
    counters: Counters,
}

impl Point {
    pub fn new(store: Arc<Store>, listener: Listener, config: PointConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            listener,
            config,
            counters: Counters {
                registrations_total: AtomicU64::new(0),
                unregistrations_total: AtomicU64::new(0),
                discoveries_total: AtomicU64::new(0),
                rejections_total: AtomicU64::new(0),
            },
        })
    }

    pub fn stats(&self) -> PointStats {
        PointStats {
            registrations_total: self.counters.registrations_total.load(Ordering::Relaxed),
            unregistrations_total: self.counters.unregistrations_total.load(Ordering::Relaxed),
            discoveries_total: self.counters.discoveries_total.load(Ordering::Relaxed),
            rejections_total: self.counters.rejections_total.load(Ordering::Relaxed),
        }
    }

    /// Spawn the accept loop and the expiry sweeper. Returns immediately;
    /// both tasks run until the underlying listener/transport is closed.
    pub fn run(self: &Arc<Self>) {
        let accept_point = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match accept_point.listener.accept().await {
                    Ok(conn) => {
                        let point = Arc::clone(&accept_point);
                        tokio::spawn(async move { point.handle_connection(conn).await });
                    }
                    Err(err) => {
                        warn!(error = %err, "rendezvous point accept loop stopping");
                        break;
                    }
                }
            }
        });

        let sweep_point = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_point.config.cleanup_interval);
            loop {
                interval.tick().await;
                let removed = sweep_point.store.cleanup_expired().await;
                if removed > 0 {
                    debug!(removed, "rendezvous point swept expired registrations");
                }
            }
        });
    }

    async fn handle_connection(self: Arc<Self>, conn: Connection) {
        loop {
            match conn.accept_stream().await {
                Ok(stream) => {
                    let point = Arc::clone(&self);
                    let remote_peer = conn.remote_peer_id();
                    tokio::spawn(async move { point.handle_stream(remote_peer, stream).await });
                }
                Err(_) => break,
            }
        }
    }

    async fn handle_stream(self: Arc<Self>, remote_peer: dep2p_types::PeerId, mut stream: Stream) {
        let message = match read_message(&mut stream).await {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "failed to read rendezvous request");
                return;
            }
        };

        match message {
            RendezvousMessage::Register {
                namespace,
                signed_record,
                ttl_secs,
            } => {
                self.handle_register(remote_peer, &mut stream, namespace, signed_record, ttl_secs)
                    .await
            }
            RendezvousMessage::Unregister { namespace, peer_id } => {
                self.handle_unregister(remote_peer, &mut stream, namespace, peer_id).await
            }
            RendezvousMessage::Discover {
                namespace,
                cursor,
                limit,
            } => self.handle_discover(&mut stream, namespace, cursor, limit).await,
            RendezvousMessage::RegisterResponse { .. } | RendezvousMessage::DiscoverResponse { .. } => {
                warn!("received a response message on the server side, ignoring");
            }
        }
    }

    async fn handle_register(
        &self,
        remote_peer: dep2p_types::PeerId,
        stream: &mut Stream,
        namespace: String,
        signed_record: crate::record::SignedPeerRecord,
        ttl_secs: u64,
    ) {
        let reject = |status: StatusCode| RendezvousMessage::RegisterResponse { status, ttl_secs: 0 };

        if namespace.is_empty() || namespace.len() > MAX_NAMESPACE_LEN {
            self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
            let _ = write_message(stream, &reject(StatusCode::InvalidNamespace)).await;
            return;
        }
        if signed_record.record.peer_id != remote_peer {
            self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
            let _ = write_message(stream, &reject(StatusCode::NotAuthorized)).await;
            return;
        }

        let response = match self
            .store
            .register(&namespace, signed_record, Duration::from_secs(ttl_secs))
            .await
        {
            Ok(ttl) => {
                self.counters.registrations_total.fetch_add(1, Ordering::Relaxed);
                RendezvousMessage::RegisterResponse {
                    status: StatusCode::Ok,
                    ttl_secs: ttl.as_secs(),
                }
            }
            Err(crate::error::StoreError::QuotaExceeded(_)) => {
                self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
                reject(StatusCode::QuotaExceeded)
            }
            Err(crate::error::StoreError::Record(_)) => {
                self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
                reject(StatusCode::InvalidSignature)
            }
            Err(crate::error::StoreError::Storage(_)) => {
                self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
                reject(StatusCode::Unavailable)
            }
            Err(_) => {
                self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
                reject(StatusCode::InternalError)
            }
        };

        let _ = write_message(stream, &response).await;
    }

    async fn handle_unregister(
        &self,
        remote_peer: dep2p_types::PeerId,
        stream: &mut Stream,
        namespace: String,
        peer_id: dep2p_types::PeerId,
    ) {
        let response = |status: StatusCode| RendezvousMessage::RegisterResponse { status, ttl_secs: 0 };

        if peer_id != remote_peer {
            self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
            let _ = write_message(stream, &response(StatusCode::NotAuthorized)).await;
            return;
        }

        let reply = if self.store.unregister(&namespace, peer_id).await.is_ok() {
            self.counters.unregistrations_total.fetch_add(1, Ordering::Relaxed);
            response(StatusCode::Ok)
        } else {
            self.counters.rejections_total.fetch_add(1, Ordering::Relaxed);
            response(StatusCode::InvalidNamespace)
        };
        let _ = write_message(stream, &reply).await;
    }

    async fn handle_discover(&self, stream: &mut Stream, namespace: String, cursor: Option<[u8; 4]>, limit: u32) {
        let (registrations, next_cursor) = self.store.discover(&namespace, cursor, limit);
        self.counters.discoveries_total.fetch_add(1, Ordering::Relaxed);

        let registrations = registrations
            .into_iter()
            .map(|registration| RegistrationView {
                namespace: namespace.clone(),
                signed_record: registration.signed_record,
                ttl_secs: registration
                    .expires_at
                    .duration_since(std::time::SystemTime::now())
                    .unwrap_or_default()
                    .as_secs(),
            })
            .collect();

        let response = RendezvousMessage::DiscoverResponse {
            registrations,
            cursor: next_cursor,
        };
        let _ = write_message(stream, &response).await;
    }
}
