use chaindns_domain::dnsutil::{split_labels, trim_zone};
use chaindns_domain::DomainError;

pub const SVC: &str = "svc";
pub const POD: &str = "pod";

/// A query name split along the cluster DNS schema. Empty fields were not
/// present in the name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordRequest {
    pub port: String,
    pub protocol: String,
    pub endpoint: String,
    pub service: String,
    pub namespace: String,
    /// `svc` or `pod`.
    pub pod_or_svc: String,
}

/// Parses one of
///
/// * `_port._protocol.service.namespace.pod|svc.zone`
/// * `endpoint.service.namespace.pod|svc.zone`
/// * `service.namespace.pod|svc.zone`
///
/// Shorter names parse into a partially filled request. Anything longer, or
/// without a `svc`/`pod` label, is an invalid request.
pub fn parse_request(name: &str, zone: &str) -> Result<RecordRequest, DomainError> {
    let mut r = RecordRequest::default();
    let base = trim_zone(name, zone);
    if base.is_empty() || base == SVC || base == POD {
        return Ok(r);
    }

    let segs = split_labels(&base);
    let mut rest = segs.iter().rev();

    let Some(kind) = rest.next() else {
        return Ok(r);
    };
    if *kind != SVC && *kind != POD {
        return Err(DomainError::InvalidRequest(name.to_string()));
    }
    r.pod_or_svc = kind.to_string();

    let Some(namespace) = rest.next() else {
        return Ok(r);
    };
    r.namespace = namespace.to_string();

    let Some(service) = rest.next() else {
        return Ok(r);
    };
    r.service = service.to_string();

    let left: Vec<&&str> = rest.collect();
    match left.as_slice() {
        [] => {}
        [endpoint] => r.endpoint = endpoint.to_string(),
        [protocol, port] => {
            r.protocol = strip_underscore(protocol).to_string();
            r.port = strip_underscore(port).to_string();
        }
        _ => return Err(DomainError::InvalidRequest(name.to_string())),
    }
    Ok(r)
}

fn strip_underscore(label: &str) -> &str {
    label.strip_prefix('_').unwrap_or(label)
}

/// `*` and `any` match every value.
pub fn wildcard(s: &str) -> bool {
    s == "*" || s == "any"
}

/// Matches a request field against an object field. Unset and wildcard
/// fields match everything.
pub fn matches(request: &str, value: &str) -> bool {
    request.is_empty() || wildcard(request) || request.eq_ignore_ascii_case(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZONE: &str = "inter.webs.test.";

    #[test]
    fn test_parse_srv_name() {
        let r = parse_request("_http._tcp.webs.mynamespace.svc.inter.webs.test.", ZONE).unwrap();
        assert_eq!(r.port, "http");
        assert_eq!(r.protocol, "tcp");
        assert_eq!(r.service, "webs");
        assert_eq!(r.namespace, "mynamespace");
        assert_eq!(r.pod_or_svc, SVC);
        assert!(r.endpoint.is_empty());
    }

    #[test]
    fn test_parse_endpoint_and_service() {
        let r = parse_request("1-2-3-4.webs.mynamespace.svc.inter.webs.test.", ZONE).unwrap();
        assert_eq!(r.endpoint, "1-2-3-4");
        assert_eq!(r.service, "webs");

        let r = parse_request("webs.mynamespace.svc.inter.webs.test.", ZONE).unwrap();
        assert_eq!(r.service, "webs");
        assert!(r.endpoint.is_empty());
    }

    #[test]
    fn test_parse_short_names() {
        assert_eq!(parse_request("inter.webs.test.", ZONE).unwrap(), RecordRequest::default());
        assert_eq!(parse_request("svc.inter.webs.test.", ZONE).unwrap(), RecordRequest::default());

        let r = parse_request("mynamespace.pod.inter.webs.test.", ZONE).unwrap();
        assert_eq!(r.pod_or_svc, POD);
        assert_eq!(r.namespace, "mynamespace");
        assert!(r.service.is_empty());
    }

    #[test]
    fn test_parse_invalid() {
        for name in [
            "webs.mynamespace.pood.inter.webs.test.",
            "too.long._http._tcp.webs.mynamespace.svc.inter.webs.test.",
            "nonexistent.inter.webs.test.",
        ] {
            assert!(
                matches!(parse_request(name, ZONE), Err(DomainError::InvalidRequest(_))),
                "{} should be invalid",
                name
            );
        }
    }

    #[test]
    fn test_matches() {
        assert!(matches("", "http"));
        assert!(matches("*", "http"));
        assert!(matches("any", "http"));
        assert!(matches("HTTP", "http"));
        assert!(!matches("dns", "http"));
    }
}
