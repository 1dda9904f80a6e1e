//! SkyDNS-style services stored as JSON under a key prefix.

mod store;

pub use store::{KvNode, KvStore, MemoryKvStore};

use async_trait::async_trait;
use chaindns_application::backend_lookup::serve_backend;
use chaindns_application::ports::{
    Handler, HandlerResult, Options, ResponseWriter, ServiceBackend, Upstream,
};
use chaindns_application::{Next, Request};
use chaindns_domain::config::EtcdConfig;
use chaindns_domain::path::{path, path_with_wildcard};
use chaindns_domain::service::group;
use chaindns_domain::{DomainError, Fall, Service, Zones};
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TTL: u32 = 300;
const DEFAULT_PRIORITY: i32 = 10;
const MIN_TTL: u32 = 30;

pub struct Etcd {
    zones: Zones,
    prefix: String,
    fall: Fall,
    timeout: Duration,
    store: Arc<dyn KvStore>,
    upstream: Option<Arc<dyn Upstream>>,
    next: Next,
}

impl Etcd {
    pub fn new(
        config: &EtcdConfig,
        store: Arc<dyn KvStore>,
        upstream: Option<Arc<dyn Upstream>>,
        next: Next,
    ) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            prefix: config.prefix.clone(),
            fall: Fall::from_config(config.fallthrough.as_deref()),
            timeout: Duration::from_millis(config.timeout_ms),
            store,
            upstream,
            next,
        }
    }

    /// Services stored for `state`'s name. `exact` reads only the name's own
    /// key; otherwise the whole subtree below it is returned, with `*` and
    /// `any` labels matching anything.
    async fn records_for(
        &self,
        state: &Request<'_>,
        exact: bool,
    ) -> Result<Vec<Service>, DomainError> {
        let name = state.name();
        let (key, star) = path_with_wildcard(name, &self.prefix);
        let nodes = tokio::time::timeout(self.timeout, self.store.get(&key, !exact))
            .await
            .map_err(|_| DomainError::Timeout(self.timeout.as_millis() as u64))??;

        let full = path(name, &self.prefix);
        let segments: Vec<&str> = full.split('/').collect();
        loop_nodes(&nodes, &segments, star, state.qtype())
    }
}

fn loop_nodes(
    nodes: &[KvNode],
    segments: &[&str],
    star: bool,
    qtype: RecordType,
) -> Result<Vec<Service>, DomainError> {
    let mut services = Vec::with_capacity(nodes.len());
    let mut seen: FxHashSet<Service> = FxHashSet::default();

    'nodes: for node in nodes {
        if star {
            let key_parts: Vec<&str> = node.key.split('/').collect();
            for (i, segment) in segments.iter().enumerate() {
                if i >= key_parts.len() {
                    continue 'nodes;
                }
                if *segment == "*" || *segment == "any" {
                    continue;
                }
                if key_parts[i] != *segment {
                    continue 'nodes;
                }
            }
        }

        let mut serv: Service = serde_json::from_str(&node.value).map_err(|e| {
            DomainError::MalformedRecord(format!("{}: {}", node.key, e))
        })?;

        let identity = Service {
            host: serv.host.clone(),
            port: serv.port,
            priority: serv.priority,
            weight: serv.weight,
            text: serv.text.clone(),
            key: node.key.clone(),
            ..Default::default()
        };
        if !seen.insert(identity) {
            continue;
        }

        serv.key = node.key.clone();
        serv.ttl = effective_ttl(node.lease, serv.ttl);
        if serv.priority == 0 {
            serv.priority = DEFAULT_PRIORITY;
        }

        if should_include(&serv, qtype) {
            services.push(serv);
        }
    }

    Ok(services)
}

/// The smaller of lease and service TTL when both are set.
fn effective_ttl(lease: u32, service_ttl: u32) -> u32 {
    match (lease, service_ttl) {
        (0, 0) => DEFAULT_TTL,
        (0, ttl) => ttl,
        (lease, 0) => lease,
        (lease, ttl) => lease.min(ttl),
    }
}

// TXT queries only want services carrying text; everything else needs a host.
fn should_include(serv: &Service, qtype: RecordType) -> bool {
    if qtype == RecordType::TXT {
        !serv.text.is_empty()
    } else {
        !serv.host.is_empty()
    }
}

#[async_trait]
impl ServiceBackend for Etcd {
    async fn services(
        &self,
        state: &Request<'_>,
        exact: bool,
        _opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        let services = self.records_for(state, exact).await?;
        Ok(group(services))
    }

    async fn reverse(
        &self,
        state: &Request<'_>,
        exact: bool,
        opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        self.services(state, exact, opt).await
    }

    async fn lookup(
        &self,
        _state: &Request<'_>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Message, DomainError> {
        match &self.upstream {
            Some(upstream) => upstream.lookup(name, qtype).await,
            None => {
                debug!(name = %name, "No upstream configured for external lookup");
                Err(DomainError::Backend(format!("no upstream to resolve {}", name)))
            }
        }
    }

    async fn records(
        &self,
        state: &Request<'_>,
        exact: bool,
    ) -> Result<Vec<Service>, DomainError> {
        self.records_for(state, exact).await
    }

    fn is_name_error(&self, err: &DomainError) -> bool {
        matches!(err, DomainError::KeyNotFound(_))
    }

    fn serial(&self, _state: &Request<'_>) -> u32 {
        chrono::Utc::now().timestamp() as u32
    }

    fn min_ttl(&self, _state: &Request<'_>) -> u32 {
        MIN_TTL
    }
}

#[async_trait]
impl Handler for Etcd {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        serve_backend(self.name(), self, &self.zones, &self.fall, &self.next, w, r).await
    }

    fn name(&self) -> &'static str {
        "etcd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_ttl() {
        assert_eq!(effective_ttl(0, 0), 300);
        assert_eq!(effective_ttl(0, 60), 60);
        assert_eq!(effective_ttl(20, 0), 20);
        assert_eq!(effective_ttl(20, 60), 20);
        assert_eq!(effective_ttl(90, 60), 60);
    }

    #[test]
    fn test_loop_nodes_matches_wildcards_label_by_label() {
        let nodes = vec![
            KvNode {
                key: "/skydns/org/example/a/x1".to_string(),
                value: r#"{"host":"10.0.0.1"}"#.to_string(),
                lease: 0,
            },
            KvNode {
                key: "/skydns/org/example/b/x1".to_string(),
                value: r#"{"host":"10.0.0.2"}"#.to_string(),
                lease: 0,
            },
            KvNode {
                key: "/skydns/org/example/a/x2".to_string(),
                value: r#"{"host":"10.0.0.3"}"#.to_string(),
                lease: 0,
            },
        ];
        let full = path("x1.*.example.org.", "/skydns");
        let segments: Vec<&str> = full.split('/').collect();
        let services = loop_nodes(&nodes, &segments, true, RecordType::A).unwrap();
        let hosts: Vec<&str> = services.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(services[0].priority, 10);
        assert_eq!(services[0].key, "/skydns/org/example/a/x1");
    }

    #[test]
    fn test_loop_nodes_rejects_bad_json() {
        let nodes = vec![KvNode {
            key: "/skydns/org/example/a".to_string(),
            value: "{not json".to_string(),
            lease: 0,
        }];
        let err = loop_nodes(&nodes, &[], false, RecordType::A).unwrap_err();
        assert!(matches!(err, DomainError::MalformedRecord(_)));
    }

    #[test]
    fn test_txt_queries_only_keep_text() {
        let nodes = vec![
            KvNode {
                key: "/skydns/org/example/t/1".to_string(),
                value: r#"{"text":"hi"}"#.to_string(),
                lease: 0,
            },
            KvNode {
                key: "/skydns/org/example/t/2".to_string(),
                value: r#"{"host":"10.0.0.1"}"#.to_string(),
                lease: 0,
            },
        ];
        assert_eq!(loop_nodes(&nodes, &[], false, RecordType::TXT).unwrap().len(), 1);
        assert_eq!(loop_nodes(&nodes, &[], false, RecordType::A).unwrap().len(), 1);
    }
}
