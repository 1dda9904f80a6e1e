use super::soa;
use crate::ports::{ResponseWriter, ServiceBackend};
use crate::request::Request;
use chaindns_domain::dnsutil::reply_to;
use chaindns_domain::DomainError;
use hickory_proto::op::ResponseCode;
use tracing::{debug, error};

/// Writes a negative answer for `state` and reports success, since a message
/// did reach the client.
///
/// NXDOMAIN and NODATA carry the zone's SOA in the authority section;
/// SERVFAIL carries nothing. `err` is only logged, tagged with the plugin
/// and the question.
pub async fn backend_error(
    plugin: &str,
    backend: &dyn ServiceBackend,
    zone: &str,
    rcode: ResponseCode,
    state: &Request<'_>,
    w: &mut dyn ResponseWriter,
    err: Option<DomainError>,
) -> Result<ResponseCode, DomainError> {
    let mut reply = reply_to(state.msg());
    reply
        .set_response_code(rcode)
        .set_authoritative(true)
        .set_recursion_available(true);

    if rcode != ResponseCode::ServFail {
        reply.add_name_server(soa(backend, zone, state)?);
    }
    state.size_and_do(&mut reply);

    let qname = state.name();
    let qtype = state.qtype();
    match err {
        Some(e) if rcode == ResponseCode::ServFail => {
            error!(plugin, zone = %zone, qname = %qname, qtype = %qtype, error = %e, "Backend failure")
        }
        Some(e) => debug!(
            plugin,
            zone = %zone,
            qname = %qname,
            qtype = %qtype,
            rcode = %rcode,
            error = %e,
            "Negative answer"
        ),
        None => debug!(
            plugin,
            zone = %zone,
            qname = %qname,
            qtype = %qtype,
            rcode = %rcode,
            "Negative answer"
        ),
    }

    w.write_msg(reply).await?;
    Ok(ResponseCode::NoError)
}
