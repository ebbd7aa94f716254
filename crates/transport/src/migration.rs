//! Connection-migration support: watches the host's network interfaces and
//! fans out an event whenever the address set changes, so callers can
//! trigger `Transport::rebind` without polling themselves.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use tokio::sync::{broadcast, Notify};
use tracing::{debug, warn};

use crate::config::MigrationConfig;

/// A single address-set transition, carrying both snapshots and the diff
/// between them so a subscriber never needs to reconstruct one from the
/// other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    pub old: HashSet<IpAddr>,
    pub new: HashSet<IpAddr>,
    pub added: Vec<IpAddr>,
    pub removed: Vec<IpAddr>,
    pub timestamp: SystemTime,
}

type Callback = Box<dyn Fn(&MigrationEvent) + Send + Sync>;

/// Polls local network interfaces on an interval and reports additions and
/// removals. Stopping is cooperative: the background task checks a
/// `Notify`-backed stop latch each iteration rather than being forcibly
/// aborted, so it never leaves the interface-diff state half-updated.
pub struct MigrationMonitor {
    config: MigrationConfig,
    current_addrs: RwLock<HashSet<IpAddr>>,
    events: broadcast::Sender<MigrationEvent>,
    callbacks: RwLock<Vec<Callback>>,
    stop: Notify,
    running: AtomicBool,
}

impl MigrationMonitor {
    pub fn new(config: MigrationConfig) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(256);
        Arc::new(Self {
            config,
            current_addrs: RwLock::new(HashSet::new()),
            events: tx,
            callbacks: RwLock::new(Vec::new()),
            stop: Notify::new(),
            running: AtomicBool::new(false),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.events.subscribe()
    }

    pub fn register_callback<F>(&self, callback: F)
    where
        F: Fn(&MigrationEvent) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .expect("migration callbacks lock poisoned")
            .push(Box::new(callback));
    }

    /// Spawn the polling loop. Idempotent: calling `start` on an
    /// already-running monitor is a no-op.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enable_auto_migration {
            return;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.seed_current_addrs();
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(this.config.poll_interval) => {
                        this.poll_once();
                    }
                    _ = this.stop.notified() => {
                        debug!("migration monitor stopping");
                        break;
                    }
                }
            }
            this.running.store(false, Ordering::SeqCst);
        });
    }

    /// Idempotent: notifying a monitor that isn't running is harmless.
    pub fn stop(&self) {
        self.stop.notify_waiters();
    }

    /// Force an immediate diff check outside the poll interval.
    pub fn trigger_migration(&self) {
        self.poll_once();
    }

    fn seed_current_addrs(&self) {
        let addrs = Self::local_addrs();
        *self
            .current_addrs
            .write()
            .expect("migration addrs lock poisoned") = addrs;
    }

    fn poll_once(&self) {
        let latest = Self::local_addrs();

        // Diff and swap under the lock, but build and fan out the event
        // after dropping it: a slow callback must never stall every other
        // caller contending on `current_addrs`.
        let diff = {
            let mut current = self
                .current_addrs
                .write()
                .expect("migration addrs lock poisoned");
            if *current == latest {
                return;
            }
            let old = current.clone();
            let added: Vec<IpAddr> = latest.difference(&old).copied().collect();
            let removed: Vec<IpAddr> = old.difference(&latest).copied().collect();
            *current = latest.clone();
            (old, added, removed)
        };

        let (old, added, removed) = diff;
        let event = MigrationEvent {
            old,
            new: latest,
            added,
            removed,
            timestamp: SystemTime::now(),
        };
        self.dispatch(&event);
    }

    fn dispatch(&self, event: &MigrationEvent) {
        let _ = self.events.send(event.clone());
        for callback in self
            .callbacks
            .read()
            .expect("migration callbacks lock poisoned")
            .iter()
        {
            callback(event);
        }
    }

    fn local_addrs() -> HashSet<IpAddr> {
        match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces
                .into_iter()
                .filter(|iface| !iface.is_loopback())
                .map(|iface| iface.ip())
                .collect(),
            Err(err) => {
                warn!(error = %err, "failed to enumerate network interfaces");
                HashSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_invokes_registered_callbacks() {
        let monitor = MigrationMonitor::new(MigrationConfig::default());
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        monitor.register_callback(move |event| {
            seen_clone.write().unwrap().push(event.clone());
        });

        let added: IpAddr = "127.0.0.1".parse().unwrap();
        let event = MigrationEvent {
            old: HashSet::new(),
            new: HashSet::from([added]),
            added: vec![added],
            removed: vec![],
            timestamp: SystemTime::now(),
        };
        monitor.dispatch(&event);

        assert_eq!(seen.read().unwrap().len(), 1);
    }
}
