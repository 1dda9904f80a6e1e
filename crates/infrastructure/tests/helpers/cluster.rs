use chaindns_domain::config::{KubernetesConfig, PodMode};
use chaindns_infrastructure::plugins::kubernetes::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node, Object, Pod, ServiceObject,
    ServicePort, ServiceType, WatchEvent, LABEL_REGION, LABEL_ZONE,
};
use chaindns_infrastructure::plugins::WatchCache;
use std::sync::Arc;

pub fn cluster_config() -> KubernetesConfig {
    KubernetesConfig {
        zones: vec!["cluster.local.".to_string(), "in-addr.arpa.".to_string()],
        namespaces: Vec::new(),
        pods: PodMode::Verified,
        endpoint_pod_names: false,
        ignore_empty_service: false,
        ttl: 5,
        fallthrough: None,
        node_name: Some("test.node".to_string()),
        host_search: Vec::new(),
        upstreams: Vec::new(),
    }
}

fn service(name: &str, cluster_ip: &str) -> ServiceObject {
    ServiceObject {
        name: name.to_string(),
        namespace: "testns".to_string(),
        cluster_ips: vec![cluster_ip.to_string()],
        ports: vec![ServicePort::new("http", "tcp", 80)],
        ..Default::default()
    }
}

fn endpoints(name: &str, addresses: Vec<EndpointAddress>) -> Endpoints {
    Endpoints {
        name: name.to_string(),
        namespace: "testns".to_string(),
        subsets: vec![EndpointSubset {
            addresses,
            ports: vec![EndpointPort {
                name: "http".to_string(),
                protocol: "tcp".to_string(),
                port: 80,
            }],
        }],
    }
}

/// A synced cache holding:
/// - `svc1.testns` at 10.0.0.1 backed by 172.0.0.1
/// - headless `hdls1.testns` with endpoints 172.0.0.2 and 172.0.0.3 (`dup-name`)
/// - `external.testns` pointing at `ext.interwebs.test.`, external IP 1.2.3.4 on `svc1`
/// - pod 10.240.0.1 in `podns` and node `test.node` in `fd-az`/`fd-r`
pub fn cluster() -> Arc<WatchCache> {
    let cache = Arc::new(WatchCache::new());
    let add = |object| cache.apply(WatchEvent::Added(object));

    add(Object::Namespace("testns".to_string()));
    add(Object::Namespace("podns".to_string()));

    let mut svc1 = service("svc1", "10.0.0.1");
    svc1.external_ips = vec!["1.2.3.4".to_string()];
    add(Object::Service(svc1));
    add(Object::Endpoints(endpoints("svc1", vec![EndpointAddress::new("172.0.0.1")])));

    add(Object::Service(service("hdls1", "None")));
    add(Object::Endpoints(endpoints(
        "hdls1",
        vec![
            EndpointAddress::new("172.0.0.2"),
            EndpointAddress {
                hostname: "dup-name".to_string(),
                ..EndpointAddress::new("172.0.0.3")
            },
        ],
    )));

    add(Object::Service(ServiceObject {
        name: "external".to_string(),
        namespace: "testns".to_string(),
        svc_type: ServiceType::ExternalName,
        external_name: "ext.interwebs.test.".to_string(),
        ports: vec![ServicePort::new("http", "tcp", 80)],
        ..Default::default()
    }));

    add(Object::Pod(Pod {
        name: "client".to_string(),
        namespace: "podns".to_string(),
        pod_ip: "10.240.0.1".to_string(),
        deleting: false,
    }));

    add(Object::Node(Node {
        name: "test.node".to_string(),
        labels: [
            (LABEL_ZONE.to_string(), "fd-az".to_string()),
            (LABEL_REGION.to_string(), "fd-r".to_string()),
        ]
        .into_iter()
        .collect(),
    }));

    cache.mark_synced();
    cache
}
