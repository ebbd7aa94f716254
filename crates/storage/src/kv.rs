//! The durable key-value abstraction the rendezvous store's persistent
//! variant is built on.

use async_trait::async_trait;

use crate::error::StorageResult;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> StorageResult<()>;
    /// All entries whose key starts with `prefix`, used to rebuild an
    /// in-memory index on startup.
    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;
}
