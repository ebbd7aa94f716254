//! Transport, session-cache, and migration-monitor configuration, with the
//! defaults spelled out in the transport core's external interface section.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub enable_quic: bool,
    pub max_idle_timeout: Duration,
    pub keep_alive_period: Duration,
    pub max_incoming_streams: u32,
    pub max_incoming_uni_streams: u32,
    pub enable_0rtt: bool,
    pub handshake_timeout: Duration,
    pub dial_timeout: Duration,
    pub session_cache: SessionCacheConfig,
    pub migration: MigrationConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            enable_quic: true,
            max_idle_timeout: Duration::from_secs(6),
            keep_alive_period: Duration::from_secs(3),
            max_incoming_streams: 1024,
            max_incoming_uni_streams: 1024,
            enable_0rtt: true,
            handshake_timeout: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(30),
            session_cache: SessionCacheConfig::default(),
            migration: MigrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    pub max_size: usize,
    pub ttl: Duration,
    pub enable_anti_replay: bool,
    pub anti_replay_window: Duration,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            ttl: Duration::from_secs(24 * 60 * 60),
            enable_anti_replay: true,
            anti_replay_window: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub poll_interval: Duration,
    pub enable_auto_migration: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            enable_auto_migration: true,
        }
    }
}
