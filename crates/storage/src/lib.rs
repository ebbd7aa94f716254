//! Durable key-value backends for the rendezvous store's persistent mode.
//!
//! `dep2p-rendezvous` keeps its namespace/peer index in memory for speed
//! and fans writes out to one of these backends so registrations survive a
//! restart. Neither backend interprets the values it stores — they're
//! opaque bytes to this crate.

pub mod error;
pub mod etcd_store;
pub mod file_store;
pub mod kv;

pub use error::{StorageError, StorageResult};
pub use etcd_store::EtcdStore;
pub use file_store::FileStore;
pub use kv::KvStore;
