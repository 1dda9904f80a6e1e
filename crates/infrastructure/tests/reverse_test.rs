mod helpers;

use chaindns_application::ports::Handler;
use chaindns_application::writer::Recorder;
use chaindns_application::Next;
use chaindns_domain::config::ReverseConfig;
use chaindns_infrastructure::plugins::Reverse;
use helpers::{ptr_target, query, rdata_string, StaticHandler};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use std::sync::Arc;

fn config(fallthrough: bool) -> ReverseConfig {
    ReverseConfig {
        networks: vec!["10.1.1.0/24".to_string(), "fd01::/64".to_string()],
        hostname: "ip-{ip}.domain.internal.".to_string(),
        ttl: 60,
        fallthrough,
    }
}

fn reverse(fallthrough: bool, next: Next) -> Reverse {
    Reverse::new(&config(fallthrough), next).unwrap()
}

#[tokio::test]
async fn test_ptr_from_template() {
    let rev = reverse(false, None);
    let mut w = Recorder::new();
    let rcode = rev
        .serve_dns(&mut w, &mut query("23.1.1.10.in-addr.arpa.", RecordType::PTR))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::NoError);
    let msg = w.msg.unwrap();
    assert_eq!(
        ptr_target(&msg.answers()[0]).as_deref(),
        Some("ip-10.1.1.23.domain.internal.")
    );
    assert_eq!(msg.answers()[0].ttl(), 60);
}

#[tokio::test]
async fn test_forward_lookup_round_trips() {
    let rev = reverse(false, None);
    let mut w = Recorder::new();
    rev.serve_dns(&mut w, &mut query("ip-10.1.1.23.domain.internal.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rdata_string(&w.msg.unwrap().answers()[0]), "10.1.1.23");

    let mut w = Recorder::new();
    rev.serve_dns(
        &mut w,
        &mut query(
            "ip-fd010000000000000000000000000001.domain.internal.",
            RecordType::AAAA,
        ),
    )
    .await
    .unwrap();
    assert_eq!(rdata_string(&w.msg.unwrap().answers()[0]), "fd01::1");
}

#[tokio::test]
async fn test_address_outside_networks_is_servfail() {
    let rev = reverse(false, None);
    let mut w = Recorder::new();
    let rcode = rev
        .serve_dns(&mut w, &mut query("ip-10.2.2.2.domain.internal.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::ServFail);
    assert!(w.msg.is_none());

    // a v4 network never answers AAAA
    let mut w = Recorder::new();
    let rcode = rev
        .serve_dns(&mut w, &mut query("ip-10.1.1.23.domain.internal.", RecordType::AAAA))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::ServFail);
}

#[tokio::test]
async fn test_fallthrough_sends_claimed_misses_next() {
    let next = Arc::new(StaticHandler::new(ResponseCode::NXDomain));
    let rev = reverse(true, Some(next.clone()));
    let mut w = Recorder::new();
    let rcode = rev
        .serve_dns(&mut w, &mut query("ip-10.2.2.2.domain.internal.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::NXDomain);
    assert_eq!(next.calls(), 1);
}

#[tokio::test]
async fn test_unclaimed_names_go_next() {
    let next = Arc::new(StaticHandler::new(ResponseCode::NoError));
    let rev = reverse(false, Some(next.clone()));

    let mut w = Recorder::new();
    rev.serve_dns(&mut w, &mut query("4.3.2.1.in-addr.arpa.", RecordType::PTR))
        .await
        .unwrap();
    let mut w = Recorder::new();
    rev.serve_dns(&mut w, &mut query("www.example.org.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(next.calls(), 2);
}
