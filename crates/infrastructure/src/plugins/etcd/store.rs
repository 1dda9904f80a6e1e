use async_trait::async_trait;
use chaindns_domain::config::EtcdSeed;
use chaindns_domain::DomainError;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// One stored key as the etcd v3 API returns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvNode {
    pub key: String,
    pub value: String,
    /// Remaining lease TTL in seconds, 0 when the key has no lease.
    pub lease: u32,
}

/// The slice of the etcd API the plugin needs.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// With `recursive`, every key below `key/` (or `key` itself when nothing
    /// is below it); otherwise only `key`. Empty results are
    /// [`DomainError::KeyNotFound`].
    async fn get(&self, key: &str, recursive: bool) -> Result<Vec<KvNode>, DomainError>;
}

/// Ordered in-process key space.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    nodes: RwLock<BTreeMap<String, KvNode>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: &str, value: &str, lease: u32) {
        self.nodes.write().await.insert(
            key.to_string(),
            KvNode {
                key: key.to_string(),
                value: value.to_string(),
                lease,
            },
        );
    }

    /// Loads configured records, keys under the plugin prefix.
    pub async fn seed(&self, seeds: &[EtcdSeed]) {
        for seed in seeds {
            self.put(&seed.key, &seed.value, seed.lease).await;
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.nodes.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str, recursive: bool) -> Result<Vec<KvNode>, DomainError> {
        let nodes = self.nodes.read().await;

        if recursive {
            let dir = if key.ends_with('/') {
                key.to_string()
            } else {
                format!("{}/", key)
            };
            let below: Vec<KvNode> = nodes
                .range(dir.clone()..)
                .take_while(|(k, _)| k.starts_with(&dir))
                .map(|(_, node)| node.clone())
                .collect();
            if !below.is_empty() {
                return Ok(below);
            }
        }

        let key = key.trim_end_matches('/');
        nodes
            .get(key)
            .map(|node| vec![node.clone()])
            .ok_or_else(|| DomainError::KeyNotFound(key.to_string()))
    }
}
