//! Cluster DNS over services, endpoints and pods.
//!
//! Names follow the schema `service.namespace.svc.zone`, with endpoint and
//! `_port._protocol` forms below services and `a-b-c-d.namespace.pod.zone`
//! for pods. Lookups are served from a [`DnsController`].

mod controller;
mod external;
mod objects;
mod parse;

pub use controller::{DnsController, WatchCache};
pub use external::{ExternalSource, K8sExternal};
pub use objects::{
    endpoint_hostname, object_key, EndpointAddress, EndpointPort, EndpointSubset, Endpoints,
    Node, Object, Pod, ServiceObject, ServicePort, ServiceType, WatchEvent, LABEL_REGION,
    LABEL_ZONE,
};
pub use parse::{parse_request, RecordRequest, POD, SVC};

use async_trait::async_trait;
use chaindns_application::backend_lookup::serve_backend;
use chaindns_application::ports::{
    AutoPather, FederationFunc, Handler, HandlerResult, Options, ResponseWriter, ServiceBackend,
    Upstream,
};
use chaindns_application::{Next, Request};
use chaindns_domain::config::{KubernetesConfig, PodMode};
use chaindns_domain::dnsutil::{
    extract_address_from_reverse, join, normalize, split_labels, trim_zone,
};
use chaindns_domain::path::path;
use chaindns_domain::{DomainError, Fall, HostType, Service, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use parse::{matches, wildcard};
use rustc_hash::FxHashSet;
use std::net::IpAddr;
use std::sync::Arc;

pub const DNS_SCHEMA_VERSION: &str = "1.0.1";
const DNS_VERSION_TTL: u32 = 28800;
const PATH_PREFIX: &str = "coredns";

pub struct Kubernetes {
    zones: Zones,
    namespaces: FxHashSet<String>,
    pod_mode: PodMode,
    endpoint_pod_names: bool,
    ignore_empty_service: bool,
    ttl: u32,
    fall: Fall,
    node_name: Option<String>,
    host_search: Vec<String>,
    controller: Arc<dyn DnsController>,
    upstream: Option<Arc<dyn Upstream>>,
    next: Next,
}

impl Kubernetes {
    pub fn new(
        config: &KubernetesConfig,
        controller: Arc<dyn DnsController>,
        upstream: Option<Arc<dyn Upstream>>,
        next: Next,
    ) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            namespaces: config.namespaces.iter().cloned().collect(),
            pod_mode: config.pods,
            endpoint_pod_names: config.endpoint_pod_names,
            ignore_empty_service: config.ignore_empty_service,
            ttl: config.ttl,
            fall: Fall::from_config(config.fallthrough.as_deref()),
            node_name: config.node_name.clone(),
            host_search: config
                .host_search
                .iter()
                .map(|s| normalize(s))
                .collect(),
            controller,
            upstream,
            next,
        }
    }

    pub fn zones(&self) -> &Zones {
        &self.zones
    }

    /// Zone used to build names in reverse answers.
    fn primary_zone(&self) -> &str {
        self.zones
            .iter()
            .find(|z| !z.ends_with(".arpa."))
            .unwrap_or(".")
    }

    fn configured_namespace(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(namespace)
    }

    fn namespace_exposed(&self, namespace: &str) -> bool {
        self.configured_namespace(namespace) && self.controller.namespace_exists(namespace)
    }

    /// Address of the service fronting this server, or the server's own
    /// address when no endpoint lists it.
    fn ns_service(&self, state: &Request<'_>) -> Service {
        let local = state.local_ip().to_string();
        let host = self
            .controller
            .ep_index_reverse(&local)
            .iter()
            .flat_map(|ep| self.controller.svc_index(&ep.key()))
            .find_map(|svc| {
                svc.cluster_ips
                    .iter()
                    .find(|ip| ip.as_str() != "None")
                    .cloned()
            })
            .unwrap_or(local);
        Service {
            host,
            key: path(state.name(), PATH_PREFIX),
            ..Default::default()
        }
    }

    async fn lookup_records(
        &self,
        state: &Request<'_>,
        _exact: bool,
    ) -> Result<Vec<Service>, DomainError> {
        let r = parse_request(state.name(), &state.zone)?;
        if r.pod_or_svc.is_empty() {
            return Ok(Vec::new());
        }
        if extract_address_from_reverse(state.name()).is_some() {
            return Err(DomainError::NoItems);
        }
        if !wildcard(&r.namespace) && !self.namespace_exposed(&r.namespace) {
            return Err(DomainError::NamespaceNotExposed(r.namespace));
        }
        if r.pod_or_svc == POD {
            return self.find_pods(&r, &state.zone);
        }
        self.find_services(&r, &state.zone)
    }

    fn find_pods(&self, r: &RecordRequest, zone: &str) -> Result<Vec<Service>, DomainError> {
        if self.pod_mode == PodMode::Disabled {
            return Err(DomainError::NoItems);
        }
        let namespace = r.namespace.as_str();
        if !wildcard(namespace) && !self.namespace_exposed(namespace) {
            return Err(DomainError::NoItems);
        }

        let podname = r.service.as_str();
        if podname.is_empty() {
            if wildcard(namespace) || self.namespace_exposed(namespace) {
                return Ok(Vec::new());
            }
            return Err(DomainError::NoItems);
        }

        let zone_path = path(zone, PATH_PREFIX);
        let key = [zone_path.as_str(), POD, namespace, podname].join("/");
        let ip = if podname.matches('-').count() == 3 && !podname.contains("--") {
            podname.replace('-', ".")
        } else {
            podname.replace('-', ":")
        };

        if self.pod_mode == PodMode::Insecure {
            if ip.parse::<IpAddr>().is_err() {
                return Err(DomainError::NoItems);
            }
            return Ok(vec![Service {
                host: ip,
                ttl: self.ttl,
                key,
                ..Default::default()
            }]);
        }

        let mut found = Vec::new();
        let mut exists = wildcard(podname) && !wildcard(namespace) && self.namespace_exposed(namespace);
        for pod in self.controller.pod_index(&ip) {
            if pod.pod_ip == ip && matches(namespace, &pod.namespace) {
                found.push(Service {
                    host: ip.clone(),
                    ttl: self.ttl,
                    key: key.clone(),
                    ..Default::default()
                });
                exists = true;
            }
        }
        if !exists {
            return Err(DomainError::NoItems);
        }
        Ok(found)
    }

    fn find_services(&self, r: &RecordRequest, zone: &str) -> Result<Vec<Service>, DomainError> {
        let namespace = r.namespace.as_str();
        if r.service.is_empty() {
            if wildcard(namespace) || self.namespace_exposed(namespace) {
                return Ok(Vec::new());
            }
            return Err(DomainError::NoItems);
        }

        let mut exists =
            wildcard(&r.service) && !wildcard(namespace) && self.namespace_exposed(namespace);

        let listing = wildcard(&r.service) || wildcard(namespace);
        let services = if listing {
            self.controller.service_list()
        } else {
            self.controller.svc_index(&object_key(namespace, &r.service))
        };
        let endpoints_for = |svc: &ServiceObject| -> Vec<Arc<Endpoints>> {
            if listing {
                self.controller
                    .endpoints_list()
                    .into_iter()
                    .filter(|ep| ep.key() == svc.key())
                    .collect()
            } else {
                self.controller.ep_index(&svc.key())
            }
        };

        let zone_path = path(zone, PATH_PREFIX);
        let mut found = Vec::new();

        for svc in services {
            if !(matches(namespace, &svc.namespace) && matches(&r.service, &svc.name)) {
                continue;
            }
            if wildcard(namespace) && !self.namespace_exposed(&svc.namespace) {
                continue;
            }
            let svc_key = [zone_path.as_str(), SVC, svc.namespace.as_str(), svc.name.as_str()].join("/");

            if self.ignore_empty_service
                && svc.svc_type != ServiceType::ExternalName
                && !svc.is_headless()
            {
                let addresses: usize = endpoints_for(&svc).iter().map(|ep| ep.address_count()).sum();
                if addresses == 0 {
                    continue;
                }
            }

            if svc.svc_type == ServiceType::ExternalName {
                let s = Service {
                    host: svc.external_name.clone(),
                    ttl: self.ttl,
                    key: svc_key,
                    ..Default::default()
                };
                if s.host_type().0 == HostType::Cname {
                    found.push(s);
                    exists = true;
                }
                continue;
            }

            if svc.is_headless() || !r.endpoint.is_empty() {
                for ep in endpoints_for(&svc) {
                    for subset in &ep.subsets {
                        for addr in &subset.addresses {
                            let hostname = endpoint_hostname(addr, self.endpoint_pod_names);
                            if !r.endpoint.is_empty() && !matches(&r.endpoint, &hostname) {
                                continue;
                            }
                            for port in &subset.ports {
                                if !(matches(&r.port, &port.name)
                                    && matches(&r.protocol, &port.protocol))
                                {
                                    continue;
                                }
                                found.push(Service {
                                    host: addr.ip.clone(),
                                    port: port.port,
                                    ttl: self.ttl,
                                    key: format!("{}/{}", svc_key, hostname),
                                    ..Default::default()
                                });
                                exists = true;
                            }
                        }
                    }
                }
                continue;
            }

            for port in &svc.ports {
                if !(matches(&r.port, &port.name) && matches(&r.protocol, &port.protocol)) {
                    continue;
                }
                exists = true;
                for ip in &svc.cluster_ips {
                    found.push(Service {
                        host: ip.clone(),
                        port: port.port,
                        ttl: self.ttl,
                        key: svc_key.clone(),
                        ..Default::default()
                    });
                }
            }
        }

        if !exists {
            return Err(DomainError::NoItems);
        }
        Ok(found)
    }

    fn service_record_for_ip(&self, ip: &str) -> Vec<Service> {
        let zone = self.primary_zone();
        for svc in self.controller.svc_index_reverse(ip) {
            if !self.namespaces.is_empty() && !self.namespace_exposed(&svc.namespace) {
                continue;
            }
            return vec![Service {
                host: join(&[svc.name.as_str(), svc.namespace.as_str(), SVC, zone]),
                ttl: self.ttl,
                ..Default::default()
            }];
        }

        let mut found = Vec::new();
        for ep in self.controller.ep_index_reverse(ip) {
            if !self.namespaces.is_empty() && !self.namespace_exposed(&ep.namespace) {
                continue;
            }
            for addr in ep.subsets.iter().flat_map(|s| s.addresses.iter()) {
                if addr.ip == ip {
                    let hostname = endpoint_hostname(addr, self.endpoint_pod_names);
                    found.push(Service {
                        host: join(&[
                            hostname.as_str(),
                            ep.name.as_str(),
                            ep.namespace.as_str(),
                            SVC,
                            zone,
                        ]),
                        ttl: self.ttl,
                        ..Default::default()
                    });
                }
            }
        }
        found
    }

    /// The pod behind a client address, only in verified pod mode.
    fn pod_with_ip(&self, ip: &str) -> Option<Arc<Pod>> {
        if self.pod_mode != PodMode::Verified {
            return None;
        }
        self.controller.pod_index(ip).into_iter().next()
    }

    /// External IP answers for `service.namespace.<zone>` names.
    fn external_services(&self, state: &Request<'_>) -> (Vec<Service>, ResponseCode) {
        let base = trim_zone(state.name(), &state.zone);
        let segs = split_labels(&base);
        let mut rest = segs.iter().rev();

        let Some(namespace) = rest.next() else {
            return (Vec::new(), ResponseCode::ServFail);
        };
        if !self.namespace_exposed(namespace) {
            return (Vec::new(), ResponseCode::NXDomain);
        }
        let Some(service) = rest.next() else {
            return (Vec::new(), ResponseCode::NoError);
        };
        let left: Vec<&&str> = rest.collect();
        let (port, protocol) = match left.as_slice() {
            [] => ("", ""),
            [protocol, port] => (
                port.trim_start_matches('_'),
                protocol.trim_start_matches('_'),
            ),
            _ => return (Vec::new(), ResponseCode::NXDomain),
        };

        let zone_path = path(&state.zone, PATH_PREFIX);
        let mut rcode = ResponseCode::NXDomain;
        let mut found = Vec::new();
        for svc in self.controller.svc_index(&object_key(namespace, service)) {
            for ip in &svc.external_ips {
                for p in &svc.ports {
                    if !(matches(port, &p.name) && matches(protocol, &p.protocol)) {
                        continue;
                    }
                    rcode = ResponseCode::NoError;
                    found.push(Service {
                        host: ip.clone(),
                        port: p.port,
                        ttl: self.ttl,
                        key: [zone_path.as_str(), svc.namespace.as_str(), svc.name.as_str()].join("/"),
                        ..Default::default()
                    });
                }
            }
        }
        (found, rcode)
    }
}

fn is_default_ns(name: &str, zone: &str) -> bool {
    name.eq_ignore_ascii_case(&join(&["ns.dns", zone]))
}

#[async_trait]
impl ServiceBackend for Kubernetes {
    async fn services(
        &self,
        state: &Request<'_>,
        _exact: bool,
        _opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        match state.qtype() {
            RecordType::TXT => {
                let base = trim_zone(state.name(), &state.zone);
                if base != "dns-version" {
                    return Ok(Vec::new());
                }
                return Ok(vec![Service {
                    text: DNS_SCHEMA_VERSION.to_string(),
                    ttl: DNS_VERSION_TTL,
                    key: path(state.name(), PATH_PREFIX),
                    ..Default::default()
                }]);
            }
            RecordType::NS => return Ok(vec![self.ns_service(state)]),
            _ => {}
        }

        if is_default_ns(state.name(), &state.zone) {
            return Ok(vec![self.ns_service(state)]);
        }

        let found = self.lookup_records(state, false).await?;
        if state.qtype() != RecordType::SRV {
            return Ok(found);
        }
        // ExternalName services have no SRV form.
        Ok(found
            .into_iter()
            .filter(|s| s.host_type().0 != HostType::Cname)
            .collect())
    }

    async fn reverse(
        &self,
        state: &Request<'_>,
        exact: bool,
        _opt: &Options,
    ) -> Result<Vec<Service>, DomainError> {
        let Some(ip) = extract_address_from_reverse(state.name()) else {
            self.lookup_records(state, exact).await?;
            return Ok(Vec::new());
        };
        let found = self.service_record_for_ip(&ip.to_string());
        if found.is_empty() {
            return Err(DomainError::NoItems);
        }
        Ok(found)
    }

    async fn lookup(
        &self,
        _state: &Request<'_>,
        name: &str,
        qtype: RecordType,
    ) -> Result<Message, DomainError> {
        match &self.upstream {
            Some(upstream) => upstream.lookup(name, qtype).await,
            None => Err(DomainError::Backend(format!(
                "no upstream configured to resolve {}",
                name
            ))),
        }
    }

    async fn records(
        &self,
        state: &Request<'_>,
        exact: bool,
    ) -> Result<Vec<Service>, DomainError> {
        self.lookup_records(state, exact).await
    }

    /// Before the first sync a missing name may simply not be cached yet,
    /// so it is reported as a failure instead.
    fn is_name_error(&self, err: &DomainError) -> bool {
        self.controller.has_synced()
            && matches!(
                err,
                DomainError::NoItems
                    | DomainError::NamespaceNotExposed(_)
                    | DomainError::InvalidRequest(_)
            )
    }

    fn serial(&self, _state: &Request<'_>) -> u32 {
        self.controller.modified() as u32
    }

    fn min_ttl(&self, _state: &Request<'_>) -> u32 {
        self.ttl
    }
}

impl AutoPather for Kubernetes {
    fn auto_path(&self, state: &Request<'_>) -> Option<Vec<String>> {
        let zone = self.zones.matches(state.name())?;
        let pod = self.pod_with_ip(&state.ip().to_string())?;

        let mut search = if zone == "." {
            vec![
                format!("{}.svc.", pod.namespace),
                "svc.".to_string(),
                ".".to_string(),
            ]
        } else {
            vec![
                format!("{}.svc.{}", pod.namespace, zone),
                format!("svc.{}", zone),
                zone.to_string(),
            ]
        };
        search.extend(self.host_search.iter().cloned());
        // Empty entry: the name as the client sent it.
        search.push(String::new());
        Some(search)
    }
}

impl FederationFunc for Kubernetes {
    fn federations(
        &self,
        state: &Request<'_>,
        fname: &str,
        fzone: &str,
    ) -> Result<Service, DomainError> {
        let node_name = self.node_name.as_deref().ok_or_else(|| {
            DomainError::Backend("local node name is not configured".to_string())
        })?;
        let node = self
            .controller
            .node_by_name(node_name)
            .ok_or_else(|| DomainError::Backend(format!("node {} not found", node_name)))?;
        let r = parse_request(state.name(), &state.zone)?;

        let (Some(lz), Some(lr)) = (node.zone(), node.region()) else {
            return Err(DomainError::Backend(
                "local node missing zone/region labels".to_string(),
            ));
        };

        let mut labels = Vec::with_capacity(8);
        if !r.endpoint.is_empty() {
            labels.push(r.endpoint.as_str());
        }
        labels.extend([
            r.service.as_str(),
            r.namespace.as_str(),
            fname,
            r.pod_or_svc.as_str(),
            lz,
            lr,
            fzone,
        ]);
        Ok(Service {
            host: join(&labels),
            ..Default::default()
        })
    }
}

impl ExternalSource for Kubernetes {
    fn external(&self, state: &Request<'_>) -> (Vec<Service>, ResponseCode) {
        self.external_services(state)
    }
}

#[async_trait]
impl Handler for Kubernetes {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        serve_backend(
            self.name(),
            self,
            &self.zones,
            &self.fall,
            &self.next,
            w,
            r,
        )
        .await
    }

    fn name(&self) -> &'static str {
        "kubernetes"
    }
}
