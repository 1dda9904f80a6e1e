use super::{a, Synthesized};
use crate::ports::{Options, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::{fqdn, is_sub_domain};
use chaindns_domain::path::domain;
use chaindns_domain::service::target_strip;
use chaindns_domain::{DomainError, HostType, Service};
use hickory_proto::rr::{Record, RecordType};
use rustc_hash::{FxHashMap, FxHashSet};

/// Weight given to services that do not set one.
const DEFAULT_WEIGHT: i64 = 100;

/// SRV records plus the addresses of their targets.
///
/// Weights are relative within a priority: each record gets
/// `floor(100 / sum(weights at its priority) * weight)`, where an unset weight
/// counts as 100, and never less than 1.
pub async fn srv(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Synthesized, DomainError> {
    let services = backend.services(state, false, opt).await?;
    let qname = state.qname();
    let mut out = Synthesized::default();
    let mut dup: FxHashSet<(String, String, u16)> = FxHashSet::default();
    let mut lookup: FxHashSet<String> = FxHashSet::default();

    let mut by_priority: FxHashMap<i32, i64> = FxHashMap::default();
    for serv in &services {
        *by_priority.entry(serv.priority).or_insert(0) += effective_weight(serv.weight);
    }

    for serv in &services {
        if serv.port == -1 {
            continue;
        }
        let total = by_priority.get(&serv.priority).copied().unwrap_or(DEFAULT_WEIGHT);
        let weight = relative_weight(total, serv.weight);

        let (what, ip) = serv.host_type();
        match (what, ip) {
            (HostType::Cname, _) => {
                out.records.push(serv.new_srv(&qname, weight)?);
                let target = target_of(serv);
                if !lookup.insert(target.clone()) {
                    continue;
                }
                resolve_target(backend, zone, state, &target, opt, &mut out.extra).await;
            }
            (HostType::A | HostType::Aaaa, Some(ip)) => {
                let addr = serv.host.clone();
                let internal = internal_service(serv);
                let target = target_of(&internal);
                let port = internal.port.clamp(0, u16::MAX as i32) as u16;

                if dup.insert((target.clone(), String::new(), port)) {
                    out.records.push(internal.new_srv(&qname, weight)?);
                }
                if dup.insert((target.clone(), addr, 0)) {
                    out.extra.push(internal.new_address(&target, ip)?);
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

/// MX records for services flagged as mail exchangers. The service priority
/// is the preference.
pub async fn mx(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Synthesized, DomainError> {
    let services = backend.services(state, false, opt).await?;
    let qname = state.qname();
    let mut out = Synthesized::default();
    let mut dup: FxHashSet<(String, String, u16)> = FxHashSet::default();
    let mut lookup: FxHashSet<String> = FxHashSet::default();

    for serv in services.iter().filter(|s| s.mail) {
        let (what, ip) = serv.host_type();
        match (what, ip) {
            (HostType::Cname, _) => {
                out.records.push(serv.new_mx(&qname)?);
                let target = target_of(serv);
                if !lookup.insert(target.clone()) {
                    continue;
                }
                resolve_target(backend, zone, state, &target, opt, &mut out.extra).await;
            }
            (HostType::A | HostType::Aaaa, Some(ip)) => {
                let addr = serv.host.clone();
                let internal = internal_service(serv);
                let target = target_of(&internal);
                let preference = internal.priority.clamp(0, u16::MAX as i32) as u16;

                if dup.insert((target.clone(), String::new(), preference)) {
                    out.records.push(internal.new_mx(&qname)?);
                }
                if dup.insert((target.clone(), addr, 0)) {
                    out.extra.push(internal.new_address(&target, ip)?);
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

fn effective_weight(weight: i32) -> i64 {
    if weight == 0 {
        DEFAULT_WEIGHT
    } else {
        weight as i64
    }
}

fn relative_weight(total: i64, weight: i32) -> u16 {
    let share = 100.0 / total as f64;
    let weight = (share * effective_weight(weight) as f64).floor();
    (weight as i64).clamp(1, u16::MAX as i64) as u16
}

/// Service whose host is replaced by the name derived from its key, for
/// services that point at a bare address.
fn internal_service(serv: &Service) -> Service {
    let mut internal = serv.clone();
    internal.host = domain(&serv.key);
    internal
}

fn target_of(serv: &Service) -> String {
    target_strip(&fqdn(&serv.host.to_ascii_lowercase()), serv.target_strip)
}

/// Adds the addresses of `target` to `extra`. Targets outside the zone go
/// through the backend's upstream lookup; CNAMEs in the AAAA answer are
/// assumed to be present from the A answer already.
async fn resolve_target(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    target: &str,
    opt: &Options,
    extra: &mut Vec<Record>,
) {
    if !is_sub_domain(zone, target) {
        if let Ok(reply) = backend.lookup(state, target, RecordType::A).await {
            extra.extend(reply.answers().iter().cloned());
        }
        if let Ok(reply) = backend.lookup(state, target, RecordType::AAAA).await {
            extra.extend(
                reply
                    .answers()
                    .iter()
                    .filter(|rr| rr.record_type() != RecordType::CNAME)
                    .cloned(),
            );
        }
        return;
    }

    let Ok(internal) = state.new_with_question(target, RecordType::A) else {
        return;
    };
    if let Ok(addrs) = a(backend, zone, &internal, Vec::new(), opt).await {
        extra.extend(addrs);
    }
}
