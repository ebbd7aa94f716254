//! `etcd-client`-backed durable key-value store.

use async_trait::async_trait;
use etcd_client::{Client, GetOptions};
use tokio::sync::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::kv::KvStore;

pub struct EtcdStore {
    client: Mutex<Client>,
}

impl EtcdStore {
    pub async fn connect(endpoints: Vec<String>) -> StorageResult<Self> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| StorageError::Etcd(e.to_string()))?;
        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

#[async_trait]
impl KvStore for EtcdStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut client = self.client.lock().await;
        client
            .put(key, value, None)
            .await
            .map_err(|e| StorageError::Etcd(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(key, None)
            .await
            .map_err(|e| StorageError::Etcd(e.to_string()))?;
        Ok(resp.kvs().first().map(|kv| kv.value().to_vec()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut client = self.client.lock().await;
        client
            .delete(key, None)
            .await
            .map_err(|e| StorageError::Etcd(e.to_string()))?;
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| StorageError::Etcd(e.to_string()))?;
        Ok(resp
            .kvs()
            .iter()
            .map(|kv| (String::from_utf8_lossy(kv.key()).into_owned(), kv.value().to_vec()))
            .collect())
    }
}
