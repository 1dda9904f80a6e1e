use chaindns_domain::path::{domain, path};
use chaindns_domain::{HostType, Service};

// ── JSON encoding ───────────────────────────────────────────────────────────

#[test]
fn test_service_decodes_store_json() {
    let svc: Service = serde_json::from_str(
        r#"{"host":"10.0.0.1","port":8080,"priority":10,"weight":5,"ttl":60,"targetstrip":1,"group":"g"}"#,
    )
    .unwrap();

    assert_eq!(svc.host, "10.0.0.1");
    assert_eq!(svc.port, 8080);
    assert_eq!(svc.target_strip, 1);
    assert_eq!(svc.group, "g");
    assert!(svc.key.is_empty());
    assert_eq!(svc.host_type().0, HostType::A);
}

#[test]
fn test_service_key_is_never_serialized() {
    let svc = Service::with_host("www.example.org", "/skydns/org/example/www");
    let json = serde_json::to_string(&svc).unwrap();
    assert_eq!(json, r#"{"host":"www.example.org"}"#);
}

#[test]
fn test_services_are_duplicates_only_when_equal() {
    let a = Service::with_host("10.0.0.1", "/skydns/a");
    let b = Service::with_host("10.0.0.1", "/skydns/b");
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}

// ── key mapping ─────────────────────────────────────────────────────────────

#[test]
fn test_path_and_domain_are_inverse() {
    let key = path("x.skydns.test.", "skydns");
    assert_eq!(key, "/skydns/test/skydns/x");
    assert_eq!(domain(&key), "x.skydns.test.");
}
