//! The in-memory namespace → peer registry, with quotas and cursor-based
//! pagination, plus an optional durable-backed variant.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

use dep2p_storage::KvStore;
use dep2p_types::PeerId;
use tracing::debug;

use crate::error::StoreError;
use crate::record::SignedPeerRecord;
use crate::wire::{cursor_from_bytes, cursor_to_bytes};

#[derive(Debug, Clone)]
pub struct Registration {
    pub signed_record: SignedPeerRecord,
    pub registered_at: SystemTime,
    pub expires_at: SystemTime,
}

impl Registration {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct Quotas {
    pub max_registrations: usize,
    pub max_namespaces: usize,
    pub max_registrations_per_namespace: usize,
    pub max_registrations_per_peer: usize,
    pub max_ttl: Duration,
    pub default_ttl: Duration,
}

impl Default for Quotas {
    fn default() -> Self {
        Self {
            max_registrations: 100_000,
            max_namespaces: 10_000,
            max_registrations_per_namespace: 1_000,
            max_registrations_per_peer: 100,
            max_ttl: Duration::from_secs(72 * 60 * 60),
            default_ttl: Duration::from_secs(2 * 60 * 60),
        }
    }
}

struct Indices {
    by_namespace: HashMap<String, HashMap<PeerId, Registration>>,
    by_peer: HashMap<PeerId, HashSet<String>>,
}

/// Namespace-keyed peer registry. Entirely in-memory; pair with
/// [`Store::with_backing`] to fan writes out to a [`KvStore`] for restart
/// durability.
pub struct Store {
    quotas: Quotas,
    indices: RwLock<Indices>,
    total: AtomicU64,
    backing: Option<std::sync::Arc<dyn KvStore>>,
}

impl Store {
    pub fn new(quotas: Quotas) -> Self {
        Self {
            quotas,
            indices: RwLock::new(Indices {
                by_namespace: HashMap::new(),
                by_peer: HashMap::new(),
            }),
            total: AtomicU64::new(0),
            backing: None,
        }
    }

    pub fn with_backing(quotas: Quotas, backing: std::sync::Arc<dyn KvStore>) -> Self {
        Self {
            quotas,
            indices: RwLock::new(Indices {
                by_namespace: HashMap::new(),
                by_peer: HashMap::new(),
            }),
            total: AtomicU64::new(0),
            backing: Some(backing),
        }
    }

    /// Rebuild the in-memory index from the durable backend's namespace
    /// prefix scan. Call once after `with_backing` before serving traffic.
    pub async fn rebuild_from_backing(&self) -> Result<(), StoreError> {
        let Some(backing) = &self.backing else {
            return Ok(());
        };
        let entries = backing.scan_prefix("").await?;
        let now = SystemTime::now();
        let mut expired_keys = Vec::new();
        let mut count = 0u64;

        {
            let mut indices = self.indices.write().expect("store lock poisoned");
            for (key, value) in &entries {
                let Some((namespace, _peer_key)) = key.split_once('/') else {
                    continue;
                };
                let Ok(registration) = serde_json::from_slice::<PersistedRegistration>(value) else {
                    continue;
                };
                if registration.expires_at <= now {
                    expired_keys.push(key.clone());
                    continue;
                }
                let peer_id = registration.signed_record.record.peer_id;
                indices
                    .by_namespace
                    .entry(namespace.to_string())
                    .or_default()
                    .insert(
                        peer_id,
                        Registration {
                            signed_record: registration.signed_record,
                            registered_at: registration.registered_at,
                            expires_at: registration.expires_at,
                        },
                    );
                indices.by_peer.entry(peer_id).or_default().insert(namespace.to_string());
                count += 1;
            }
            self.total.store(count, Ordering::Relaxed);
        }

        for key in expired_keys {
            backing.delete(&key).await?;
        }
        Ok(())
    }

    pub async fn register(
        &self,
        namespace: &str,
        signed_record: SignedPeerRecord,
        ttl: Duration,
    ) -> Result<Duration, StoreError> {
        signed_record.verify()?;
        let peer_id = signed_record.record.peer_id;
        // ttl=0 means "use the default"; anything else is capped at, but
        // never floored below, the maximum.
        let ttl = if ttl.is_zero() {
            self.quotas.default_ttl
        } else {
            ttl.min(self.quotas.max_ttl)
        };
        let now = SystemTime::now();
        let registration = Registration {
            signed_record: signed_record.clone(),
            registered_at: now,
            expires_at: now + ttl,
        };

        {
            let mut indices = self.indices.write().expect("store lock poisoned");
            let is_new_namespace = !indices.by_namespace.contains_key(namespace);
            if is_new_namespace && indices.by_namespace.len() >= self.quotas.max_namespaces {
                return Err(StoreError::QuotaExceeded("max namespaces reached"));
            }

            let namespace_entries = indices.by_namespace.entry(namespace.to_string()).or_default();
            let is_new_registration = !namespace_entries.contains_key(&peer_id);
            if is_new_registration && namespace_entries.len() >= self.quotas.max_registrations_per_namespace {
                return Err(StoreError::QuotaExceeded("max registrations per namespace reached"));
            }

            let peer_namespaces = indices.by_peer.entry(peer_id).or_default();
            if is_new_registration
                && !peer_namespaces.contains(namespace)
                && peer_namespaces.len() >= self.quotas.max_registrations_per_peer
            {
                return Err(StoreError::QuotaExceeded("max registrations per peer reached"));
            }
            if is_new_registration && self.total.load(Ordering::Relaxed) as usize >= self.quotas.max_registrations {
                return Err(StoreError::QuotaExceeded("max total registrations reached"));
            }

            namespace_entries.insert(peer_id, registration.clone());
            peer_namespaces.insert(namespace.to_string());
            if is_new_registration {
                self.total.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(backing) = &self.backing {
            let persisted = PersistedRegistration {
                signed_record,
                registered_at: registration.registered_at,
                expires_at: registration.expires_at,
            };
            let key = format!("{}/{}", namespace, peer_id);
            let value = serde_json::to_vec(&persisted)
                .map_err(|_| StoreError::Record(crate::error::RecordError::Malformed))?;
            backing.put(&key, value).await?;
        }

        Ok(ttl)
    }

    pub async fn unregister(&self, namespace: &str, peer_id: PeerId) -> Result<(), StoreError> {
        {
            let mut indices = self.indices.write().expect("store lock poisoned");
            let removed = indices
                .by_namespace
                .get_mut(namespace)
                .and_then(|entries| entries.remove(&peer_id))
                .is_some();
            if !removed {
                return Err(StoreError::RegistrationNotFound);
            }
            if let Some(entries) = indices.by_namespace.get(namespace) {
                if entries.is_empty() {
                    indices.by_namespace.remove(namespace);
                }
            }
            if let Some(namespaces) = indices.by_peer.get_mut(&peer_id) {
                namespaces.remove(namespace);
                if namespaces.is_empty() {
                    indices.by_peer.remove(&peer_id);
                }
            }
            self.total.fetch_sub(1, Ordering::Relaxed);
        }

        if let Some(backing) = &self.backing {
            let key = format!("{}/{}", namespace, peer_id);
            backing.delete(&key).await?;
        }
        Ok(())
    }

    /// Paginated discovery: `cursor` is an opaque 4-byte offset into a
    /// stable (sorted-by-peer-id) ordering of the namespace's live
    /// registrations.
    pub fn discover(
        &self,
        namespace: &str,
        cursor: Option<[u8; 4]>,
        limit: u32,
    ) -> (Vec<Registration>, Option<[u8; 4]>) {
        let now = SystemTime::now();
        let indices = self.indices.read().expect("store lock poisoned");
        let Some(entries) = indices.by_namespace.get(namespace) else {
            return (Vec::new(), None);
        };

        let mut sorted: Vec<&Registration> = entries
            .values()
            .filter(|registration| !registration.is_expired(now))
            .collect();
        sorted.sort_by_key(|registration| registration.signed_record.record.peer_id);
        let total_unexpired = sorted.len();

        let offset = cursor.map(cursor_from_bytes).unwrap_or(0) as usize;
        let limit = limit.max(1) as usize;
        let page: Vec<Registration> = sorted
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        let next_offset = offset + page.len();
        let next_cursor = if next_offset < total_unexpired {
            Some(cursor_to_bytes(next_offset as u32))
        } else {
            None
        };
        (page, next_cursor)
    }

    /// Remove every expired registration across all namespaces. Returns the
    /// number removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = SystemTime::now();
        let expired: Vec<(String, PeerId)> = {
            let indices = self.indices.read().expect("store lock poisoned");
            indices
                .by_namespace
                .iter()
                .flat_map(|(namespace, entries)| {
                    entries
                        .iter()
                        .filter(|(_, registration)| registration.is_expired(now))
                        .map(|(peer_id, _)| (namespace.clone(), *peer_id))
                        .collect::<Vec<_>>()
                })
                .collect()
        };

        for (namespace, peer_id) in &expired {
            let _ = self.unregister(namespace, *peer_id).await;
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "swept expired registrations");
        }
        expired.len()
    }

    pub fn total_registrations(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PersistedRegistration {
    signed_record: SignedPeerRecord,
    registered_at: SystemTime,
    expires_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep2p_identity::Identity;

    fn record(seq: u64) -> (Identity, SignedPeerRecord) {
        let identity = Identity::generate_ed25519();
        let addr: dep2p_types::Multiaddr = "/ip4/127.0.0.1/udp/4001/quic-v1".parse().unwrap();
        let signed = SignedPeerRecord::sign(&identity, vec![addr], seq).unwrap();
        (identity, signed)
    }

    #[tokio::test]
    async fn register_then_discover_returns_entry() {
        let store = Store::new(Quotas::default());
        let (_identity, signed) = record(1);
        store.register("chat", signed.clone(), Duration::from_secs(60)).await.unwrap();

        let (page, cursor) = store.discover("chat", None, 10);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].signed_record.record.peer_id, signed.record.peer_id);
        assert!(cursor.is_none());
    }

    #[tokio::test]
    async fn unregister_removes_entry() {
        let store = Store::new(Quotas::default());
        let (_identity, signed) = record(1);
        let peer_id = signed.record.peer_id;
        store.register("chat", signed, Duration::from_secs(60)).await.unwrap();
        store.unregister("chat", peer_id).await.unwrap();

        let (page, _) = store.discover("chat", None, 10);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn pagination_splits_across_cursor() {
        let store = Store::new(Quotas::default());
        for i in 0..5u64 {
            let (_identity, signed) = record(i);
            store.register("chat", signed, Duration::from_secs(60)).await.unwrap();
        }

        let (first_page, cursor) = store.discover("chat", None, 2);
        assert_eq!(first_page.len(), 2);
        let cursor = cursor.expect("more pages remain");

        let (second_page, _) = store.discover("chat", Some(cursor), 10);
        assert_eq!(second_page.len(), 3);
    }

    #[tokio::test]
    async fn quota_rejects_past_max_registrations_per_namespace() {
        let mut quotas = Quotas::default();
        quotas.max_registrations_per_namespace = 1;
        let store = Store::new(quotas);
        let (_identity_a, signed_a) = record(1);
        let (_identity_b, signed_b) = record(2);
        store.register("chat", signed_a, Duration::from_secs(60)).await.unwrap();
        let result = store.register("chat", signed_b, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(StoreError::QuotaExceeded(_))));
    }
}
