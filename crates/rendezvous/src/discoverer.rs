//! Client side of the rendezvous protocol: registers and renews this
//! node's own advertisement, and discovers peers advertised by others,
//! against a pool of rendezvous points selected round-robin.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dep2p_identity::Identity;
use dep2p_transport::Transport;
use dep2p_types::{Multiaddr, PeerId};
use tracing::{error, warn};

use crate::error::DiscovererError;
use crate::record::SignedPeerRecord;
use crate::wire::{read_message, write_message, DiscoveredPeer, RendezvousMessage, StatusCode};

const UNHEALTHY_COOLDOWN: Duration = Duration::from_secs(5 * 60);
const UNHEALTHY_THRESHOLD: u32 = 3;

struct PointHandle {
    addr: Multiaddr,
    fail_count: AtomicU32,
    cooldown_until: RwLock<Option<Instant>>,
}

impl PointHandle {
    fn is_available(&self) -> bool {
        match *self.cooldown_until.read().expect("point lock poisoned") {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    /// Only benches a point once it has failed `UNHEALTHY_THRESHOLD` times
    /// in a row; a single blip shouldn't take a point out of rotation.
    fn mark_unhealthy(&self) {
        let failures = self.fail_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= UNHEALTHY_THRESHOLD {
            *self.cooldown_until.write().expect("point lock poisoned") = Some(Instant::now() + UNHEALTHY_COOLDOWN);
        }
    }

    fn mark_healthy(&self) {
        self.fail_count.store(0, Ordering::Relaxed);
        *self.cooldown_until.write().expect("point lock poisoned") = None;
    }
}

/// Registers this node's addresses with, and discovers peers from, a pool
/// of rendezvous points.
pub struct Discoverer {
    transport: Arc<Transport>,
    identity: Arc<Identity>,
    points: Vec<Arc<PointHandle>>,
    next_point: AtomicUsize,
    renewal_failures_total: AtomicU64,
}

impl Discoverer {
    pub fn new(transport: Arc<Transport>, identity: Arc<Identity>, points: Vec<Multiaddr>) -> Arc<Self> {
        let points = points
            .into_iter()
            .map(|addr| {
                Arc::new(PointHandle {
                    addr,
                    fail_count: AtomicU32::new(0),
                    cooldown_until: RwLock::new(None),
                })
            })
            .collect();
        Arc::new(Self {
            transport,
            identity,
            points,
            next_point: AtomicUsize::new(0),
            renewal_failures_total: AtomicU64::new(0),
        })
    }

    pub fn renewal_failures_total(&self) -> u64 {
        self.renewal_failures_total.load(Ordering::Relaxed)
    }

    fn select_point(&self) -> Result<Arc<PointHandle>, DiscovererError> {
        if self.points.is_empty() {
            return Err(DiscovererError::NoPoints);
        }
        let start = self.next_point.fetch_add(1, Ordering::Relaxed) % self.points.len();
        for offset in 0..self.points.len() {
            let point = &self.points[(start + offset) % self.points.len()];
            if point.is_available() {
                return Ok(Arc::clone(point));
            }
        }
        Err(DiscovererError::AllPointsUnhealthy)
    }

    pub async fn register(
        &self,
        namespace: &str,
        addresses: Vec<Multiaddr>,
        ttl: Duration,
        seq: u64,
    ) -> Result<Duration, DiscovererError> {
        let signed_record = SignedPeerRecord::sign(&self.identity, addresses, seq)
            .map_err(|_| DiscovererError::Codec(crate::error::CodecError::Encode("signing failed".into())))?;

        let point = self.select_point()?;
        let result = self
            .send_request(
                &point,
                RendezvousMessage::Register {
                    namespace: namespace.to_string(),
                    signed_record,
                    ttl_secs: ttl.as_secs(),
                },
            )
            .await;

        match result {
            Ok(RendezvousMessage::RegisterResponse { status: StatusCode::Ok, ttl_secs }) => {
                point.mark_healthy();
                Ok(Duration::from_secs(ttl_secs))
            }
            Ok(RendezvousMessage::RegisterResponse { status, .. }) => {
                point.mark_healthy();
                Err(DiscovererError::Rejected(status))
            }
            Ok(_) => Err(DiscovererError::Codec(crate::error::CodecError::Decode(
                "unexpected response variant".into(),
            ))),
            Err(err) => {
                point.mark_unhealthy();
                Err(err)
            }
        }
    }

    pub async fn unregister(&self, namespace: &str, peer_id: PeerId) -> Result<(), DiscovererError> {
        let point = self.select_point()?;
        let result = self
            .send_request(
                &point,
                RendezvousMessage::Unregister {
                    namespace: namespace.to_string(),
                    peer_id,
                },
            )
            .await;

        match result {
            Ok(RendezvousMessage::RegisterResponse { status: StatusCode::Ok, .. }) => {
                point.mark_healthy();
                Ok(())
            }
            Ok(RendezvousMessage::RegisterResponse { status, .. }) => {
                point.mark_healthy();
                Err(DiscovererError::Rejected(status))
            }
            Ok(_) => Err(DiscovererError::Codec(crate::error::CodecError::Decode(
                "unexpected response variant".into(),
            ))),
            Err(err) => {
                point.mark_unhealthy();
                Err(err)
            }
        }
    }

    pub async fn discover(
        &self,
        namespace: &str,
        cursor: Option<[u8; 4]>,
        limit: u32,
    ) -> Result<(Vec<DiscoveredPeer>, Option<[u8; 4]>), DiscovererError> {
        let point = self.select_point()?;
        let result = self
            .send_request(
                &point,
                RendezvousMessage::Discover {
                    namespace: namespace.to_string(),
                    cursor,
                    limit,
                },
            )
            .await;

        match result {
            Ok(RendezvousMessage::DiscoverResponse { registrations, cursor }) => {
                point.mark_healthy();
                let peers = registrations
                    .into_iter()
                    .map(|view| DiscoveredPeer {
                        peer_id: view.signed_record.record.peer_id,
                        addresses: view.signed_record.record.addresses,
                    })
                    .collect();
                Ok((peers, cursor))
            }
            Ok(_) => Err(DiscovererError::Codec(crate::error::CodecError::Decode(
                "unexpected response variant".into(),
            ))),
            Err(err) => {
                point.mark_unhealthy();
                Err(err)
            }
        }
    }

    /// Page through every registration in `namespace`, following cursors
    /// until the server stops returning one.
    pub async fn find_peers(&self, namespace: &str) -> Result<Vec<DiscoveredPeer>, DiscovererError> {
        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let (mut page, next_cursor) = self.discover(namespace, cursor, 100).await?;
            all.append(&mut page);
            match next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(all)
    }

    async fn send_request(
        &self,
        point: &PointHandle,
        request: RendezvousMessage,
    ) -> Result<RendezvousMessage, DiscovererError> {
        let conn = self.transport.dial(&point.addr, None).await?;
        let mut stream = conn.open_stream().await?;
        write_message(&mut stream, &request).await?;
        let response = read_message(&mut stream).await?;
        Ok(response)
    }

    /// Spawn a background loop that re-registers `namespace` at roughly
    /// half its TTL, for as long as the returned handle is held. Renewal
    /// failures are logged and counted in `renewal_failures_total`, never
    /// propagated — a transient rendezvous outage should not unwind
    /// whatever task called `advertise`.
    pub fn advertise(self: &Arc<Self>, namespace: String, addresses: Vec<Multiaddr>, ttl: Duration) -> AdvertiseHandle {
        let stop = Arc::new(tokio::sync::Notify::new());
        let stop_clone = Arc::clone(&stop);
        let this = Arc::clone(self);

        tokio::spawn(async move {
            let mut seq = 0u64;
            loop {
                seq += 1;
                match this.register(&namespace, addresses.clone(), ttl, seq).await {
                    Ok(granted_ttl) => {
                        let renew_after = granted_ttl / 2;
                        tokio::select! {
                            _ = tokio::time::sleep(renew_after.max(Duration::from_secs(1))) => {}
                            _ = stop_clone.notified() => break,
                        }
                    }
                    Err(err) => {
                        this.renewal_failures_total.fetch_add(1, Ordering::Relaxed);
                        error!(namespace = %namespace, error = %err, "rendezvous renewal failed, will retry");
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                            _ = stop_clone.notified() => break,
                        }
                    }
                }
            }
            warn!(namespace = %namespace, "rendezvous advertisement loop stopped");
        });

        AdvertiseHandle { stop }
    }
}

/// Dropping or calling [`AdvertiseHandle::stop`] ends the background
/// renewal loop it was returned from.
pub struct AdvertiseHandle {
    stop: Arc<tokio::sync::Notify>,
}

impl AdvertiseHandle {
    pub fn stop(&self) {
        self.stop.notify_waiters();
    }
}
