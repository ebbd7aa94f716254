//! 0-RTT session ticket cache and anti-replay nonce window.
//!
//! Each `Transport` owns its own `SessionCache` instance — tickets are
//! never shared across transports, since a 0-RTT ticket is only valid
//! against the TLS server config it was issued by. Lookups and inserts
//! never suspend: all state lives behind a `std::sync::RwLock`, never a
//! tokio lock, so the cache can be touched from both the dial path and the
//! periodic sweep task without risking a held lock across an `.await`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use dep2p_types::PeerId;

use crate::config::SessionCacheConfig;

struct CacheEntry {
    ticket: Vec<u8>,
    inserted_at: Instant,
}

struct Inner {
    entries: HashMap<PeerId, CacheEntry>,
    order: VecDeque<PeerId>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SessionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// 0-RTT resumption ticket store with TTL expiry and LRU eviction once
/// `max_size` is reached.
pub struct SessionCache {
    config: SessionCacheConfig,
    inner: RwLock<Inner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    anti_replay: AntiReplayCache,
}

impl SessionCache {
    pub fn new(config: SessionCacheConfig) -> Arc<Self> {
        let anti_replay = AntiReplayCache::new(config.anti_replay_window);
        Arc::new(Self {
            config,
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            anti_replay,
        })
    }

    pub fn put(&self, peer_id: PeerId, ticket: Vec<u8>) {
        let mut inner = self.inner.write().expect("session cache lock poisoned");
        if !inner.entries.contains_key(&peer_id) {
            inner.order.push_back(peer_id);
        }
        inner.entries.insert(
            peer_id,
            CacheEntry {
                ticket,
                inserted_at: Instant::now(),
            },
        );
        while inner.entries.len() > self.config.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<Vec<u8>> {
        let mut inner = self.inner.write().expect("session cache lock poisoned");
        let expired = inner
            .entries
            .get(peer_id)
            .map(|entry| entry.inserted_at.elapsed() > self.config.ttl)
            .unwrap_or(false);
        if expired {
            inner.entries.remove(peer_id);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        match inner.entries.get(peer_id) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.ticket.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn remove(&self, peer_id: &PeerId) {
        let mut inner = self.inner.write().expect("session cache lock poisoned");
        inner.entries.remove(peer_id);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("session cache lock poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.read().expect("session cache lock poisoned").entries.len()
    }

    pub fn stats(&self) -> SessionCacheStats {
        SessionCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn anti_replay(&self) -> &AntiReplayCache {
        &self.anti_replay
    }

    /// Drop every entry whose TTL has elapsed. Called periodically by a
    /// background sweeper; safe to call concurrently with `get`/`put`.
    pub fn sweep_expired(&self) {
        let mut inner = self.inner.write().expect("session cache lock poisoned");
        let ttl = self.config.ttl;
        let expired: Vec<PeerId> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > ttl)
            .map(|(peer_id, _)| *peer_id)
            .collect();
        for peer_id in expired {
            inner.entries.remove(&peer_id);
            inner.order.retain(|p| p != &peer_id);
        }
    }
}

/// Tracks 0-RTT resumption nonces seen within a rolling time window,
/// rejecting anything already observed to guard against replay of early
/// data.
pub struct AntiReplayCache {
    window: Duration,
    seen: RwLock<HashMap<Vec<u8>, Instant>>,
}

impl AntiReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if `nonce` is fresh (and records it), `false` if it
    /// has already been seen within the window.
    pub fn check(&self, nonce: &[u8]) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.write().expect("anti-replay lock poisoned");
        seen.retain(|_, seen_at| now.duration_since(*seen_at) <= self.window);
        if seen.contains_key(nonce) {
            false
        } else {
            seen.insert(nonce.to_vec(), now);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dep2p_types::KeyAlgorithm;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_public_key(KeyAlgorithm::Ed25519, &[seed; 32])
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = SessionCache::new(SessionCacheConfig::default());
        let peer_id = peer(1);
        cache.put(peer_id, vec![1, 2, 3]);
        assert_eq!(cache.get(&peer_id), Some(vec![1, 2, 3]));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn evicts_oldest_once_over_capacity() {
        let mut config = SessionCacheConfig::default();
        config.max_size = 2;
        let cache = SessionCache::new(config);
        cache.put(peer(1), vec![1]);
        cache.put(peer(2), vec![2]);
        cache.put(peer(3), vec![3]);
        assert_eq!(cache.size(), 2);
        assert!(cache.get(&peer(1)).is_none());
    }

    #[test]
    fn anti_replay_rejects_repeated_nonce() {
        let anti_replay = AntiReplayCache::new(Duration::from_secs(10));
        assert!(anti_replay.check(b"nonce-a"));
        assert!(!anti_replay.check(b"nonce-a"));
        assert!(anti_replay.check(b"nonce-b"));
    }
}
