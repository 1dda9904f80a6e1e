//! The parts of Kubernetes API objects the DNS schema reads.

use std::collections::BTreeMap;

pub const LABEL_ZONE: &str = "failure-domain.beta.kubernetes.io/zone";
pub const LABEL_REGION: &str = "failure-domain.beta.kubernetes.io/region";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServiceType {
    #[default]
    ClusterIp,
    NodePort,
    LoadBalancer,
    ExternalName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServicePort {
    pub name: String,
    pub protocol: String,
    pub port: i32,
}

impl ServicePort {
    pub fn new(name: &str, protocol: &str, port: i32) -> Self {
        Self {
            name: name.to_string(),
            protocol: protocol.to_string(),
            port,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceObject {
    pub name: String,
    pub namespace: String,
    /// Empty or `["None"]` for headless services.
    pub cluster_ips: Vec<String>,
    pub svc_type: ServiceType,
    pub external_name: String,
    pub ports: Vec<ServicePort>,
    pub external_ips: Vec<String>,
}

impl ServiceObject {
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }

    pub fn is_headless(&self) -> bool {
        self.cluster_ips.is_empty() || self.cluster_ips[0] == "None"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointAddress {
    pub ip: String,
    pub hostname: String,
    pub node_name: String,
    /// Name of the pod backing this address, if known.
    pub target_ref_name: String,
}

impl EndpointAddress {
    pub fn new(ip: &str) -> Self {
        Self {
            ip: ip.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPort {
    pub name: String,
    pub protocol: String,
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoints {
    pub name: String,
    pub namespace: String,
    pub subsets: Vec<EndpointSubset>,
}

impl Endpoints {
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }

    pub fn address_count(&self) -> usize {
        self.subsets.iter().map(|s| s.addresses.len()).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pod {
    pub name: String,
    pub namespace: String,
    pub pod_ip: String,
    /// Set once the pod has a deletion timestamp.
    pub deleting: bool,
}

impl Pod {
    pub fn key(&self) -> String {
        object_key(&self.namespace, &self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl Node {
    pub fn zone(&self) -> Option<&str> {
        self.labels.get(LABEL_ZONE).map(String::as_str)
    }

    pub fn region(&self) -> Option<&str> {
        self.labels.get(LABEL_REGION).map(String::as_str)
    }
}

/// Index key shared by services, endpoints and pods.
pub fn object_key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Service(ServiceObject),
    Endpoints(Endpoints),
    Pod(Pod),
    Node(Node),
    Namespace(String),
}

/// One change as delivered by an API watch.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Added(Object),
    Modified(Object),
    Deleted(Object),
}

/// Host label used for an endpoint address in headless answers.
pub fn endpoint_hostname(addr: &EndpointAddress, endpoint_pod_names: bool) -> String {
    if !addr.hostname.is_empty() {
        return addr.hostname.clone();
    }
    if endpoint_pod_names && !addr.target_ref_name.is_empty() {
        return addr.target_ref_name.clone();
    }
    if addr.ip.contains('.') {
        return addr.ip.replace('.', "-");
    }
    if addr.ip.contains(':') {
        return addr.ip.replace(':', "-");
    }
    String::new()
}
