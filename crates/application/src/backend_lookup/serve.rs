use super::{a, aaaa, backend_error, cname, mx, ns, ptr, soa, srv, txt, Synthesized};
use crate::chain::{next_or_failure, Next};
use crate::ports::{HandlerResult, Options, ResponseWriter, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::{dedup, reply_to};
use chaindns_domain::{DomainError, Fall, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::RecordType;
use tracing::debug;

/// The query handling every backend plugin shares.
///
/// Names outside `zones` go to the next plugin. Inside, the query type
/// selects the synthesis function; not-found becomes NXDOMAIN (or falls
/// through), other errors SERVFAIL and an empty result NODATA.
pub async fn serve_backend(
    plugin: &str,
    backend: &dyn ServiceBackend,
    zones: &Zones,
    fall: &Fall,
    next: &Next,
    w: &mut dyn ResponseWriter,
    r: &mut Message,
) -> HandlerResult {
    let opt = Options::default();

    let (zone, outcome) = {
        let mut state = Request::new(r, &*w);
        let Some(zone) = zones.matches(state.name()).map(str::to_string) else {
            drop(state);
            return next_or_failure(plugin, next, w, r).await;
        };
        state.zone = zone.clone();
        let outcome = synthesize(backend, &zone, &state, &opt).await;
        (zone, outcome)
    };

    let mut state = Request::new(r, &*w);
    state.zone = zone.clone();

    let found = match outcome {
        Err(e) if backend.is_name_error(&e) => {
            if fall.through(state.name()) {
                debug!(plugin, qname = %state.name(), "Falling through");
                drop(state);
                return next_or_failure(plugin, next, w, r).await;
            }
            return backend_error(plugin, backend, &zone, ResponseCode::NXDomain, &state, w, None)
                .await;
        }
        Err(e) => {
            return backend_error(plugin, backend, &zone, ResponseCode::ServFail, &state, w, Some(e))
                .await;
        }
        Ok(found) => found,
    };

    if found.records.is_empty() {
        return backend_error(plugin, backend, &zone, ResponseCode::NoError, &state, w, None)
            .await;
    }

    let mut reply = reply_to(state.msg());
    reply
        .set_response_code(ResponseCode::NoError)
        .set_authoritative(true)
        .set_recursion_available(true);
    reply.insert_answers(dedup(found.records));
    reply.insert_additionals(dedup(found.extra));

    let reply = state.scrub(reply);
    w.write_msg(reply).await?;
    Ok(ResponseCode::NoError)
}

async fn synthesize(
    backend: &dyn ServiceBackend,
    zone: &str,
    state: &Request<'_>,
    opt: &Options,
) -> Result<Synthesized, DomainError> {
    let records = |records| Synthesized {
        records,
        extra: Vec::new(),
    };

    match state.qtype() {
        RecordType::A => a(backend, zone, state, Vec::new(), opt).await.map(records),
        RecordType::AAAA => aaaa(backend, zone, state, Vec::new(), opt).await.map(records),
        RecordType::TXT => txt(backend, zone, state, opt).await.map(records),
        RecordType::CNAME => cname(backend, zone, state, opt).await.map(records),
        RecordType::PTR => ptr(backend, zone, state, opt).await.map(records),
        RecordType::MX => mx(backend, zone, state, opt).await,
        RecordType::SRV => srv(backend, zone, state, opt).await,
        RecordType::SOA if state.name() == zone => {
            soa(backend, zone, state).map(|rr| records(vec![rr]))
        }
        RecordType::NS if state.name() == zone => ns(backend, zone, state, opt).await,
        _ => {
            // NODATA and NXDOMAIN differ only in whether the name exists.
            a(backend, zone, state, Vec::new(), opt)
                .await
                .map(|_| Synthesized::default())
        }
    }
}
