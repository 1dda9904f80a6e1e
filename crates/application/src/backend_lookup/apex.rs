use super::Synthesized;
use crate::ports::{Options, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::{join, to_name};
use chaindns_domain::path::domain;
use chaindns_domain::{DomainError, HostType};
use hickory_proto::rr::rdata::SOA;
use hickory_proto::rr::{RData, Record, RecordType};

const SOA_TTL: u32 = 300;
const SOA_REFRESH: i32 = 7200;
const SOA_RETRY: i32 = 1800;
const SOA_EXPIRE: i32 = 86400;

/// NS records for `zone`. Name servers are stored as services under
/// `ns.dns.<zone>` and must point at addresses.
pub async fn ns(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Synthesized, DomainError> {
    let ns_query = state.new_with_question(&join(&["ns.dns", zone]), RecordType::A)?;
    let services = backend.services(&ns_query, false, opt).await?;
    let qname = state.qname();

    let mut out = Synthesized::default();
    for mut serv in services {
        let (what, ip) = serv.host_type();
        match (what, ip) {
            (HostType::Cname, _) => {
                return Err(DomainError::MalformedRecord(format!(
                    "NS record must be an IP address: {}",
                    serv.host
                )));
            }
            (HostType::A | HostType::Aaaa, Some(ip)) => {
                serv.host = domain(&serv.key);
                out.records.push(serv.new_ns(&qname)?);
                out.extra.push(serv.new_address(&serv.host, ip)?);
            }
            _ => {}
        }
    }
    Ok(out)
}

/// Synthetic SOA for `zone`; never touches the backend's services.
pub fn soa(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
) -> Result<Record, DomainError> {
    let min_ttl = backend.min_ttl(state);
    let ttl = SOA_TTL.min(min_ttl);

    let soa = SOA::new(
        to_name(&join(&["ns.dns", zone]))?,
        to_name(&join(&["hostmaster", zone]))?,
        backend.serial(state),
        SOA_REFRESH,
        SOA_RETRY,
        SOA_EXPIRE,
        min_ttl,
    );
    Ok(Record::from_rdata(to_name(zone)?, ttl, RData::SOA(soa)))
}
