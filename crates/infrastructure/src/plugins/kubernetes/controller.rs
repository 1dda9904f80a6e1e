//! Indexed, read-only view of the cluster objects the DNS schema needs.

use super::objects::{Endpoints, Node, Object, Pod, ServiceObject, WatchEvent};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// What the kubernetes plugin reads. Every lookup is served from memory.
pub trait DnsController: Send + Sync {
    fn service_list(&self) -> Vec<Arc<ServiceObject>>;
    fn endpoints_list(&self) -> Vec<Arc<Endpoints>>;
    /// Services stored under a `namespace/name` key.
    fn svc_index(&self, key: &str) -> Vec<Arc<ServiceObject>>;
    /// Services owning `ip` as a cluster IP.
    fn svc_index_reverse(&self, ip: &str) -> Vec<Arc<ServiceObject>>;
    fn ep_index(&self, key: &str) -> Vec<Arc<Endpoints>>;
    /// Endpoints with an address equal to `ip`.
    fn ep_index_reverse(&self, ip: &str) -> Vec<Arc<Endpoints>>;
    /// Live pods with `ip` as pod IP.
    fn pod_index(&self, ip: &str) -> Vec<Arc<Pod>>;
    fn namespace_exists(&self, name: &str) -> bool;
    fn node_by_name(&self, name: &str) -> Option<Arc<Node>>;
    fn has_synced(&self) -> bool;
    /// Unix time of the last applied change.
    fn modified(&self) -> i64;
}

type ReverseIndex = FxHashMap<String, FxHashSet<String>>;

#[derive(Default)]
struct Store {
    services: BTreeMap<String, Arc<ServiceObject>>,
    endpoints: BTreeMap<String, Arc<Endpoints>>,
    pods: BTreeMap<String, Arc<Pod>>,
    nodes: FxHashMap<String, Arc<Node>>,
    namespaces: FxHashSet<String>,
    svc_by_ip: ReverseIndex,
    ep_by_ip: ReverseIndex,
    pod_by_ip: ReverseIndex,
}

fn index_add(index: &mut ReverseIndex, ip: &str, key: &str) {
    index.entry(ip.to_string()).or_default().insert(key.to_string());
}

fn index_remove(index: &mut ReverseIndex, ip: &str, key: &str) {
    if let Some(keys) = index.get_mut(ip) {
        keys.remove(key);
        if keys.is_empty() {
            index.remove(ip);
        }
    }
}

fn lookup<T>(index: &ReverseIndex, objects: &BTreeMap<String, Arc<T>>, ip: &str) -> Vec<Arc<T>> {
    let Some(keys) = index.get(ip) else {
        return Vec::new();
    };
    let mut keys: Vec<&String> = keys.iter().collect();
    keys.sort();
    keys.into_iter()
        .filter_map(|k| objects.get(k).cloned())
        .collect()
}

fn endpoint_ips(ep: &Endpoints) -> impl Iterator<Item = &str> {
    ep.subsets
        .iter()
        .flat_map(|s| s.addresses.iter())
        .map(|a| a.ip.as_str())
}

impl Store {
    fn upsert(&mut self, object: Object) {
        match object {
            Object::Service(svc) => {
                self.remove(&Object::Service(svc.clone()));
                let key = svc.key();
                for ip in &svc.cluster_ips {
                    if ip != "None" {
                        index_add(&mut self.svc_by_ip, ip, &key);
                    }
                }
                self.services.insert(key, Arc::new(svc));
            }
            Object::Endpoints(ep) => {
                self.remove(&Object::Endpoints(ep.clone()));
                let key = ep.key();
                for ip in endpoint_ips(&ep) {
                    index_add(&mut self.ep_by_ip, ip, &key);
                }
                self.endpoints.insert(key, Arc::new(ep));
            }
            Object::Pod(pod) => {
                self.remove(&Object::Pod(pod.clone()));
                let key = pod.key();
                if !pod.pod_ip.is_empty() {
                    index_add(&mut self.pod_by_ip, &pod.pod_ip, &key);
                }
                self.pods.insert(key, Arc::new(pod));
            }
            Object::Node(node) => {
                self.nodes.insert(node.name.clone(), Arc::new(node));
            }
            Object::Namespace(name) => {
                self.namespaces.insert(name);
            }
        }
    }

    // Removal goes by key, so the indexes are cleaned from the stored copy.
    fn remove(&mut self, object: &Object) {
        match object {
            Object::Service(svc) => {
                let key = svc.key();
                if let Some(old) = self.services.remove(&key) {
                    for ip in &old.cluster_ips {
                        index_remove(&mut self.svc_by_ip, ip, &key);
                    }
                }
            }
            Object::Endpoints(ep) => {
                let key = ep.key();
                if let Some(old) = self.endpoints.remove(&key) {
                    for ip in endpoint_ips(&old) {
                        index_remove(&mut self.ep_by_ip, ip, &key);
                    }
                }
            }
            Object::Pod(pod) => {
                let key = pod.key();
                if let Some(old) = self.pods.remove(&key) {
                    index_remove(&mut self.pod_by_ip, &old.pod_ip, &key);
                }
            }
            Object::Node(node) => {
                self.nodes.remove(&node.name);
            }
            Object::Namespace(name) => {
                self.namespaces.remove(name);
            }
        }
    }
}

/// In-memory cache fed by watch events.
///
/// Writers go through [`WatchCache::apply`]; the consumer task spawned by
/// [`WatchCache::spawn_consumer`] does that for an event stream.
#[derive(Default)]
pub struct WatchCache {
    store: RwLock<Store>,
    synced: AtomicBool,
    modified: AtomicI64,
}

impl WatchCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, event: WatchEvent) {
        {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            match event {
                WatchEvent::Added(object) | WatchEvent::Modified(object) => store.upsert(object),
                WatchEvent::Deleted(object) => store.remove(&object),
            }
        }
        self.modified
            .store(chrono::Utc::now().timestamp(), Ordering::Release);
    }

    /// Marks the initial listing as complete.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }

    /// Applies events from `events` until the channel closes or `shutdown`
    /// fires. The cache counts as synced once the first batch is drained.
    pub fn spawn_consumer(
        self: Arc<Self>,
        mut events: mpsc::Receiver<WatchEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting kubernetes watch consumer");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Kubernetes watch consumer shutting down");
                        break;
                    }
                    event = events.recv() => {
                        let Some(event) = event else {
                            debug!("Watch channel closed");
                            break;
                        };
                        self.apply(event);
                        if events.is_empty() {
                            self.mark_synced();
                        }
                    }
                }
            }
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Store> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }
}

impl DnsController for WatchCache {
    fn service_list(&self) -> Vec<Arc<ServiceObject>> {
        self.read().services.values().cloned().collect()
    }

    fn endpoints_list(&self) -> Vec<Arc<Endpoints>> {
        self.read().endpoints.values().cloned().collect()
    }

    fn svc_index(&self, key: &str) -> Vec<Arc<ServiceObject>> {
        self.read().services.get(key).cloned().into_iter().collect()
    }

    fn svc_index_reverse(&self, ip: &str) -> Vec<Arc<ServiceObject>> {
        let store = self.read();
        lookup(&store.svc_by_ip, &store.services, ip)
    }

    fn ep_index(&self, key: &str) -> Vec<Arc<Endpoints>> {
        self.read().endpoints.get(key).cloned().into_iter().collect()
    }

    fn ep_index_reverse(&self, ip: &str) -> Vec<Arc<Endpoints>> {
        let store = self.read();
        lookup(&store.ep_by_ip, &store.endpoints, ip)
    }

    fn pod_index(&self, ip: &str) -> Vec<Arc<Pod>> {
        let store = self.read();
        lookup(&store.pod_by_ip, &store.pods, ip)
            .into_iter()
            .filter(|p| !p.deleting)
            .collect()
    }

    fn namespace_exists(&self, name: &str) -> bool {
        self.read().namespaces.contains(name)
    }

    fn node_by_name(&self, name: &str) -> Option<Arc<Node>> {
        self.read().nodes.get(name).cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn modified(&self) -> i64 {
        self.modified.load(Ordering::Acquire)
    }
}
