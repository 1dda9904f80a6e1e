mod helpers;

use chaindns_application::ports::{Handler, Refresher};
use chaindns_application::writer::Recorder;
use chaindns_application::Next;
use chaindns_domain::config::HostsConfig;
use chaindns_infrastructure::plugins::Hosts;
use helpers::{owner, ptr_target, query, rdata_string, StaticHandler};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use std::io::Write;
use std::sync::Arc;

fn config(path: Option<String>) -> HostsConfig {
    HostsConfig {
        zones: vec![".".to_string()],
        path,
        entries: vec!["10.0.0.7 inline.example.org".to_string()],
        ttl: 3600,
        reload_secs: 5,
        fallthrough: None,
    }
}

fn hosts_file(lines: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(lines.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn hosts(file: &tempfile::NamedTempFile, next: Next) -> Hosts {
    let path = file.path().to_string_lossy().to_string();
    let hosts = Hosts::new(&config(Some(path)), next);
    hosts.refresh().await.unwrap();
    hosts
}

#[tokio::test]
async fn test_file_and_inline_entries() {
    let file = hosts_file("10.0.0.1 Web.Example.ORG web\n::1 web.example.org\n");
    let h = hosts(&file, None).await;
    assert!(h.watches_file());

    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("web.example.org.", RecordType::A))
        .await
        .unwrap();
    let msg = w.msg.unwrap();
    assert_eq!(rdata_string(&msg.answers()[0]), "10.0.0.1");
    assert_eq!(msg.answers()[0].ttl(), 3600);
    assert_eq!(owner(&msg.answers()[0]), "web.example.org.");

    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("web.example.org.", RecordType::AAAA))
        .await
        .unwrap();
    assert_eq!(rdata_string(&w.msg.unwrap().answers()[0]), "::1");

    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("inline.example.org.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rdata_string(&w.msg.unwrap().answers()[0]), "10.0.0.7");
}

#[tokio::test]
async fn test_reverse_lookup() {
    let file = hosts_file("10.0.0.1 web.example.org\n");
    let h = hosts(&file, None).await;
    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("1.0.0.10.in-addr.arpa.", RecordType::PTR))
        .await
        .unwrap();
    assert_eq!(
        ptr_target(&w.msg.unwrap().answers()[0]).as_deref(),
        Some("web.example.org.")
    );
}

#[tokio::test]
async fn test_known_name_other_type_is_nodata() {
    let file = hosts_file("10.0.0.1 web.example.org\n");
    let h = hosts(&file, None).await;
    let mut w = Recorder::new();
    let rcode = h
        .serve_dns(&mut w, &mut query("web.example.org.", RecordType::MX))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::NoError);
    let msg = w.msg.unwrap();
    assert_eq!(msg.response_code(), ResponseCode::NoError);
    assert!(msg.answers().is_empty());
}

#[tokio::test]
async fn test_unknown_name_without_fallthrough_is_servfail() {
    let file = hosts_file("10.0.0.1 web.example.org\n");
    let h = hosts(&file, None).await;
    let mut w = Recorder::new();
    let rcode = h
        .serve_dns(&mut w, &mut query("other.example.org.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::ServFail);
    assert!(w.msg.is_none());
}

#[tokio::test]
async fn test_fallthrough_goes_next() {
    let next = Arc::new(StaticHandler::new(ResponseCode::NoError));
    let mut c = config(None);
    c.fallthrough = Some(Vec::new());
    let h = Hosts::new(&c, Some(next.clone()));
    assert!(!h.watches_file());
    assert_eq!(Handler::name(&h), "hosts");
    assert_eq!(Refresher::name(&h), "hosts");

    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("other.example.org.", RecordType::A))
        .await
        .unwrap();
    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("9.9.9.9.in-addr.arpa.", RecordType::PTR))
        .await
        .unwrap();
    assert_eq!(next.calls(), 2);
}

#[tokio::test]
async fn test_refresh_picks_up_changes() {
    let file = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(file.path(), "10.0.0.1 web.example.org\n").unwrap();
    let h = hosts(&file, None).await;

    // Force a different mtime than the first load.
    std::thread::sleep(std::time::Duration::from_millis(20));
    std::fs::write(file.path(), "10.0.0.2 web.example.org\n").unwrap();
    let modified = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
    std::fs::File::options()
        .write(true)
        .open(file.path())
        .unwrap()
        .set_modified(modified)
        .unwrap();
    h.refresh().await.unwrap();

    let mut w = Recorder::new();
    h.serve_dns(&mut w, &mut query("web.example.org.", RecordType::A))
        .await
        .unwrap();
    let msg = w.msg.unwrap();
    assert_eq!(msg.answers().len(), 1);
    assert_eq!(rdata_string(&msg.answers()[0]), "10.0.0.2");
}

#[tokio::test]
async fn test_missing_file_fails_refresh() {
    let h = Hosts::new(&config(Some("/nonexistent/chaindns/hosts".to_string())), None);
    assert!(h.refresh().await.is_err());
    assert_eq!(Refresher::name(&h), "hosts");
}
