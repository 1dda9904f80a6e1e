use crate::ports::{Options, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::{fqdn, is_sub_domain, name_to_string};
use chaindns_domain::{DomainError, HostType};
use futures::future::BoxFuture;
use hickory_proto::rr::{RData, Record, RecordType};
use rustc_hash::FxHashSet;

/// Longest CNAME chain followed before giving up.
const MAX_PREVIOUS_RECORDS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

impl Family {
    fn host_type(self) -> HostType {
        match self {
            Family::V4 => HostType::A,
            Family::V6 => HostType::Aaaa,
        }
    }
}

/// A records for the request, following CNAME-typed services.
///
/// `previous` holds the CNAMEs already emitted on the way here.
pub async fn a(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    previous: Vec<Record>,
    opt: &Options,
) -> Result<Vec<Record>, DomainError> {
    address(backend, zone, state, previous, opt, Family::V4).await
}

/// AAAA counterpart of [`a`].
pub async fn aaaa(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    previous: Vec<Record>,
    opt: &Options,
) -> Result<Vec<Record>, DomainError> {
    address(backend, zone, state, previous, opt, Family::V6).await
}

fn address<'a, 'r: 'a>(
    backend: &'a dyn ServiceBackend,
    zone: &'a str,
    state: &'a Request<'r>,
    previous: Vec<Record>,
    opt: &'a Options,
    family: Family,
) -> BoxFuture<'a, Result<Vec<Record>, DomainError>> {
    Box::pin(async move {
        let services = backend.services(state, false, opt).await?;
        let qname = state.qname();
        let mut records = Vec::new();
        let mut dup: FxHashSet<String> = FxHashSet::default();

        for serv in services {
            let (what, ip) = serv.host_type();

            if what == HostType::Cname {
                let target = fqdn(&serv.host.to_ascii_lowercase());
                if target == state.name() {
                    continue;
                }
                if previous.len() > MAX_PREVIOUS_RECORDS {
                    continue;
                }
                let cname = serv.new_cname(&qname, &target)?;
                if is_duplicate_cname(&cname, &previous) {
                    continue;
                }

                let next_state = state.new_with_question(&target, state.qtype())?;
                let mut chain = previous.clone();
                chain.push(cname.clone());

                match address(backend, zone, &next_state, chain, opt, family).await {
                    Ok(found) if !found.is_empty() => {
                        records.push(cname);
                        records.extend(found);
                        continue;
                    }
                    _ => {}
                }

                if is_sub_domain(zone, &target) {
                    continue;
                }
                if let Ok(reply) = backend.lookup(state, &target, state.qtype()).await {
                    records.push(cname);
                    records.extend(reply.answers().iter().cloned());
                }
                continue;
            }

            if what != family.host_type() {
                continue;
            }
            let Some(ip) = ip else { continue };
            if dup.insert(serv.host.clone()) {
                records.push(serv.new_address(&qname, ip)?);
            }
        }

        Ok(records)
    })
}

fn is_duplicate_cname(cname: &Record, previous: &[Record]) -> bool {
    let target = match cname.data() {
        Some(RData::CNAME(c)) => name_to_string(&c.0),
        _ => return false,
    };
    let owner = name_to_string(cname.name());
    previous.iter().any(|rec| {
        rec.record_type() == RecordType::CNAME
            && name_to_string(rec.name()) == owner
            && matches!(rec.data(), Some(RData::CNAME(c)) if name_to_string(&c.0) == target)
    })
}
