use crate::ports::{Options, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::fqdn;
use chaindns_domain::DomainError;
use hickory_proto::rr::Record;
use rustc_hash::FxHashSet;
use std::net::IpAddr;

/// The CNAME of the first exactly-matching service. Services pointing at an
/// address never produce a CNAME.
pub async fn cname(
    backend: &dyn ServiceBackend,
    _zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Vec<Record>, DomainError> {
    let services = backend.services(state, true, opt).await?;
    let Some(serv) = services.first() else {
        return Ok(Vec::new());
    };
    if serv.host.parse::<IpAddr>().is_ok() {
        return Ok(Vec::new());
    }
    Ok(vec![serv.new_cname(&state.qname(), &fqdn(&serv.host))?])
}

pub async fn txt(
    backend: &dyn ServiceBackend,
    _zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Vec<Record>, DomainError> {
    let services = backend.services(state, false, opt).await?;
    let qname = state.qname();
    services
        .iter()
        .filter(|s| !s.text.is_empty())
        .map(|s| s.new_txt(&qname))
        .collect()
}

pub async fn ptr(
    backend: &dyn ServiceBackend,
    _zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Vec<Record>, DomainError> {
    let services = backend.reverse(state, true, opt).await?;
    let qname = state.qname();
    let mut seen = FxHashSet::default();
    let mut records = Vec::new();
    for serv in services {
        if serv.host.parse::<IpAddr>().is_ok() {
            continue;
        }
        if seen.insert(serv.host.clone()) {
            records.push(serv.new_ptr(&qname, &fqdn(&serv.host))?);
        }
    }
    Ok(records)
}
