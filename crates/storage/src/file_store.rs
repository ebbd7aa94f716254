//! File-backed key-value store for deployments that don't want an etcd
//! dependency: the whole map is kept in memory and persisted to a single
//! JSON file on every write via a temp-file-plus-rename, so a crash mid
//! write never leaves a torn file behind.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StorageResult;
use crate::kv::KvStore;

#[derive(Serialize, Deserialize, Default)]
struct OnDisk {
    entries: HashMap<String, String>,
}

pub struct FileStore {
    path: PathBuf,
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl FileStore {
    pub async fn open(path: PathBuf) -> StorageResult<Self> {
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let on_disk: OnDisk = serde_json::from_slice(&bytes)?;
                on_disk
                    .entries
                    .into_iter()
                    .map(|(k, v)| {
                        let bytes = base64_decode(&v);
                        (k, bytes)
                    })
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn persist(&self, data: &HashMap<String, Vec<u8>>) -> StorageResult<()> {
        let on_disk = OnDisk {
            entries: data
                .iter()
                .map(|(k, v)| (k.clone(), base64_encode(v)))
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&on_disk)?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&tmp_path, permissions).await?;
        }

        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.insert(key.to_string(), value);
        self.persist(&data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut data = self.data.write().await;
        data.remove(key);
        self.persist(&data).await
    }

    async fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .data
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> Vec<u8> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(path).await.unwrap();

        store.put("ns/peer-a", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("ns/peer-a").await.unwrap(), Some(vec![1, 2, 3]));

        store.delete("ns/peer-a").await.unwrap();
        assert_eq!(store.get("ns/peer-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn reopening_rebuilds_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        {
            let store = FileStore::open(path.clone()).await.unwrap();
            store.put("ns/peer-a", vec![9]).await.unwrap();
        }
        let reopened = FileStore::open(path).await.unwrap();
        assert_eq!(reopened.get("ns/peer-a").await.unwrap(), Some(vec![9]));
    }

    #[tokio::test]
    async fn scan_prefix_filters_by_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(path).await.unwrap();
        store.put("ns-a/peer-1", vec![1]).await.unwrap();
        store.put("ns-b/peer-1", vec![2]).await.unwrap();

        let results = store.scan_prefix("ns-a/").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "ns-a/peer-1");
    }
}
