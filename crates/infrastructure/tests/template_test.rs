mod helpers;

use chaindns_application::ports::Handler;
use chaindns_application::writer::Recorder;
use chaindns_application::Next;
use chaindns_domain::config::TemplateConfig;
use chaindns_domain::DomainError;
use chaindns_infrastructure::plugins::Template;
use chaindns_infrastructure::TracingMetrics;
use helpers::{owner, query, rdata_string, StaticHandler};
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;
use std::sync::Arc;

fn config() -> TemplateConfig {
    TemplateConfig {
        zones: vec!["example.".to_string()],
        class: "IN".to_string(),
        qtype: "A".to_string(),
        regex: vec![
            r"^ip-(?P<a>[0-9]+)-(?P<b>[0-9]+)-(?P<c>[0-9]+)-(?P<d>[0-9]+)[.]example[.]$".to_string(),
        ],
        answer: vec![
            "{{ .Name }} 60 IN A {{ .Group.a }}.{{ .Group.b }}.{{ .Group.c }}.{{ .Group.d }}"
                .to_string(),
        ],
        additional: Vec::new(),
        authority: Vec::new(),
        rcode: "NOERROR".to_string(),
        fallthrough: None,
    }
}

fn template(config: &TemplateConfig, next: Next) -> (Template, Arc<TracingMetrics>) {
    let metrics = Arc::new(TracingMetrics::new());
    let t = Template::new(config, metrics.clone(), next).unwrap();
    (t, metrics)
}

#[tokio::test]
async fn test_template_answers_from_groups() {
    let (t, metrics) = template(&config(), None);
    let mut w = Recorder::new();
    let mut r = query("ip-10-95-12-8.example.", RecordType::A);
    let rcode = t.serve_dns(&mut w, &mut r).await.unwrap();

    assert_eq!(rcode, ResponseCode::NoError);
    let msg = w.msg.unwrap();
    assert!(msg.authoritative());
    assert_eq!(msg.answers().len(), 1);
    assert_eq!(owner(&msg.answers()[0]), "ip-10-95-12-8.example.");
    assert_eq!(rdata_string(&msg.answers()[0]), "10.95.12.8");
    assert_eq!(msg.answers()[0].ttl(), 60);
    assert_eq!(metrics.get("template_matches_total", &[("zone", "example.")]), 1);
}

#[tokio::test]
async fn test_template_index_and_authority() {
    let mut c = config();
    c.answer = vec!["{{ .Name }} 60 IN A {{ index .Match 1 }}.0.0.{{ index .Match 4 }}".to_string()];
    c.authority =
        vec!["example. 60 IN SOA ns.example. hostmaster.example. 1 7200 1800 86400 30".to_string()];
    let (t, _) = template(&c, None);
    let mut w = Recorder::new();
    let mut r = query("ip-10-95-12-8.example.", RecordType::A);
    t.serve_dns(&mut w, &mut r).await.unwrap();

    let msg = w.msg.unwrap();
    assert_eq!(rdata_string(&msg.answers()[0]), "10.0.0.8");
    assert_eq!(msg.name_servers()[0].record_type(), RecordType::SOA);
}

#[tokio::test]
async fn test_no_match_in_zone_is_nxdomain() {
    let (t, metrics) = template(&config(), None);
    let mut w = Recorder::new();
    let mut r = query("www.example.", RecordType::A);
    let rcode = t.serve_dns(&mut w, &mut r).await.unwrap();
    assert_eq!(rcode, ResponseCode::NXDomain);
    assert_eq!(w.rcode(), Some(ResponseCode::NXDomain));
    assert_eq!(metrics.get("template_matches_total", &[("zone", "example.")]), 0);
}

#[tokio::test]
async fn test_other_type_is_not_a_match() {
    let (t, _) = template(&config(), None);
    let mut w = Recorder::new();
    let mut r = query("ip-10-95-12-8.example.", RecordType::AAAA);
    t.serve_dns(&mut w, &mut r).await.unwrap();
    assert_eq!(w.rcode(), Some(ResponseCode::NXDomain));
}

#[tokio::test]
async fn test_fallthrough_and_out_of_zone_go_next() {
    let next = Arc::new(StaticHandler::new(ResponseCode::NoError));
    let mut c = config();
    c.fallthrough = Some(Vec::new());
    let (t, _) = template(&c, Some(next.clone()));

    let mut w = Recorder::new();
    t.serve_dns(&mut w, &mut query("www.example.", RecordType::A))
        .await
        .unwrap();
    let mut w = Recorder::new();
    t.serve_dns(&mut w, &mut query("www.example.org.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(next.calls(), 2);
}

#[tokio::test]
async fn test_unwritten_rcode_writes_nothing() {
    let mut c = config();
    c.rcode = "SERVFAIL".to_string();
    let (t, _) = template(&c, None);
    let mut w = Recorder::new();
    let rcode = t
        .serve_dns(&mut w, &mut query("ip-10-95-12-8.example.", RecordType::A))
        .await
        .unwrap();
    assert_eq!(rcode, ResponseCode::ServFail);
    assert!(w.msg.is_none());
}

#[tokio::test]
async fn test_unparsable_rendering_is_an_error() {
    let mut c = config();
    c.answer = vec!["{{ .Name }} 60 IN A {{ .Group.a }}".to_string()];
    let (t, _) = template(&c, None);
    let mut w = Recorder::new();
    let err = t
        .serve_dns(&mut w, &mut query("ip-10-95-12-8.example.", RecordType::A))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MalformedRecord(_)));
    assert!(w.msg.is_none());
}

#[test]
fn test_bad_templates_are_rejected() {
    let mut c = config();
    c.answer = vec!["example. 60 IN A not-an-ip".to_string()];
    assert!(Template::new(&c, Arc::new(TracingMetrics::new()), None).is_err());

    let mut c = config();
    c.regex = vec!["(unclosed".to_string()];
    assert!(Template::new(&c, Arc::new(TracingMetrics::new()), None).is_err());

    let mut c = config();
    c.rcode = "MAYBE".to_string();
    assert!(Template::new(&c, Arc::new(TracingMetrics::new()), None).is_err());
}
