//! Builds the plugin chain from configuration, tail first, so that every
//! plugin is constructed with the rest of the chain as its `next`.

use anyhow::{anyhow, bail};
use chaindns_application::ports::{
    AutoPather, FederationFunc, Handler, MetricsSink, Refresher, Upstream,
};
use chaindns_application::Next;
use chaindns_domain::config::PluginConfig;
use chaindns_domain::Config;
use chaindns_infrastructure::dns::UdpUpstream;
use chaindns_infrastructure::plugins::etcd::MemoryKvStore;
use chaindns_infrastructure::plugins::kubernetes::ExternalSource;
use chaindns_infrastructure::plugins::{
    AutoPath, Etcd, Federation, Forward, Hosts, K8sExternal, Kubernetes, Reverse, Rewrite,
    Template, WatchCache,
};
use chaindns_jobs::{JobRunner, RefreshJob};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Chain {
    pub head: Arc<dyn Handler>,
    /// Plugin names in query order.
    pub names: Vec<&'static str>,
    pub jobs: JobRunner,
}

pub struct ChainBuilder {
    metrics: Arc<dyn MetricsSink>,
}

impl ChainBuilder {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Self {
        Self { metrics }
    }

    pub async fn build(&self, config: &Config) -> anyhow::Result<Chain> {
        let mut next: Next = None;
        let mut names = Vec::with_capacity(config.plugins.len());
        let mut jobs = JobRunner::new();
        // Set once the kubernetes plugin is built; plugins in front of it
        // use it as their search path, federation or external source.
        let mut kubernetes: Option<Arc<Kubernetes>> = None;

        for plugin in config.plugins.iter().rev() {
            let handler: Arc<dyn Handler> = match plugin {
                PluginConfig::Forward(c) => {
                    let upstream = upstream(&c.upstreams, c.timeout_ms)?
                        .ok_or_else(|| anyhow!("forward: no upstreams"))?;
                    Arc::new(Forward::new(&c.zones, upstream, next.take()))
                }
                PluginConfig::Etcd(c) => {
                    let store = Arc::new(MemoryKvStore::new());
                    store.seed(&c.records).await;
                    info!(keys = store.len().await, "Seeded etcd store");
                    let upstream = upstream(&c.upstreams, c.timeout_ms)?;
                    Arc::new(Etcd::new(c, store, upstream, next.take()))
                }
                PluginConfig::Kubernetes(c) => {
                    // No API watcher feeds this cache yet; an empty synced
                    // cache answers NXDOMAIN instead of SERVFAIL.
                    let cache = Arc::new(WatchCache::new());
                    cache.mark_synced();
                    let upstream = upstream(&c.upstreams, 5000)?;
                    let k = Arc::new(Kubernetes::new(c, cache, upstream, next.take()));
                    kubernetes = Some(k.clone());
                    k
                }
                PluginConfig::K8sExternal(c) => {
                    let source: Arc<dyn ExternalSource> =
                        require_kubernetes(&kubernetes, "k8s_external")?;
                    Arc::new(K8sExternal::new(c, source, next.take()))
                }
                PluginConfig::Hosts(c) => {
                    let hosts = Arc::new(Hosts::new(c, next.take()));
                    if hosts.watches_file() {
                        let refresher: Arc<dyn Refresher> = hosts.clone();
                        jobs = jobs
                            .with_refresh(RefreshJob::new(refresher).with_interval(c.reload_secs));
                    }
                    hosts
                }
                PluginConfig::Reverse(c) => Arc::new(Reverse::new(c, next.take())?),
                PluginConfig::Template(c) => {
                    Arc::new(Template::new(c, self.metrics.clone(), next.take())?)
                }
                PluginConfig::Rewrite(c) => Arc::new(Rewrite::new(c, next.take())?),
                PluginConfig::Autopath(c) => {
                    let search_from: Option<Arc<dyn AutoPather>> = match c.search_from.as_deref() {
                        None => None,
                        Some("kubernetes") => {
                            Some(require_kubernetes(&kubernetes, "autopath")? as Arc<dyn AutoPather>)
                        }
                        Some(other) => bail!("autopath: {} cannot provide a search path", other),
                    };
                    Arc::new(AutoPath::new(c, search_from, self.metrics.clone(), next.take()))
                }
                PluginConfig::Federation(c) => {
                    let func: Arc<dyn FederationFunc> =
                        require_kubernetes(&kubernetes, "federation")?;
                    Arc::new(Federation::new(c, func, next.take()))
                }
            };
            names.push(plugin.name());
            next = Some(handler);
        }

        let head = next.ok_or_else(|| anyhow!("no plugins configured"))?;
        names.reverse();
        if let Some(last) = names.last().filter(|n| **n != "forward") {
            warn!(last = *last, "Chain does not end in forward, names nobody answers will fail");
        }

        Ok(Chain { head, names, jobs })
    }
}

fn require_kubernetes(
    kubernetes: &Option<Arc<Kubernetes>>,
    plugin: &str,
) -> anyhow::Result<Arc<Kubernetes>> {
    kubernetes
        .clone()
        .ok_or_else(|| anyhow!("{}: needs a kubernetes plugin later in the chain", plugin))
}

fn upstream(servers: &[String], timeout_ms: u64) -> anyhow::Result<Option<Arc<dyn Upstream>>> {
    if servers.is_empty() {
        return Ok(None);
    }
    let servers = servers
        .iter()
        .map(|s| s.parse::<SocketAddr>())
        .collect::<Result<Vec<_>, _>>()?;
    let upstream = UdpUpstream::new(servers, Duration::from_millis(timeout_ms))?;
    Ok(Some(Arc::new(upstream)))
}
