//! Answers for services' external IPs under a zone outside the cluster.
//!
//! `service.namespace.<zone>` resolves to the service's external addresses.
//! The zone apex carries a synthesized SOA and an `ns1.<apex>.<zone>` name
//! server pointing at this server.

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, ResponseWriter};
use chaindns_application::{next_or_failure, Next, Request};
use chaindns_domain::config::K8sExternalConfig;
use chaindns_domain::dnsutil::{count_labels, is_sub_domain, join, reply_to, to_name, trim_zone};
use chaindns_domain::{DomainError, HostType, Service, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{NS, SOA};
use hickory_proto::rr::{RData, Record, RecordType};
use std::net::IpAddr;
use std::sync::Arc;

const HOSTMASTER: &str = "hostmaster";
const SERIAL: u32 = 12345;

/// Produces external services and the rcode to use when there are none.
pub trait ExternalSource: Send + Sync {
    fn external(&self, state: &Request<'_>) -> (Vec<Service>, ResponseCode);
}

pub struct K8sExternal {
    zones: Zones,
    ttl: u32,
    apex: String,
    source: Arc<dyn ExternalSource>,
    next: Next,
}

impl K8sExternal {
    pub fn new(config: &K8sExternalConfig, source: Arc<dyn ExternalSource>, next: Next) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            ttl: config.ttl,
            apex: config.apex.clone(),
            source,
            next,
        }
    }

    fn ns_name(&self, zone: &str) -> String {
        join(&["ns1", self.apex.as_str(), zone])
    }

    fn soa(&self, zone: &str) -> Result<Record, DomainError> {
        let soa = SOA::new(
            to_name(&self.ns_name(zone))?,
            to_name(&join(&[HOSTMASTER, self.apex.as_str(), zone]))?,
            SERIAL,
            7200,
            1800,
            86400,
            self.ttl,
        );
        Ok(Record::from_rdata(to_name(zone)?, self.ttl, RData::SOA(soa)))
    }

    fn address(&self, name: &str, ip: IpAddr, qtype: RecordType) -> Result<Option<Record>, DomainError> {
        let serv = Service {
            ttl: self.ttl,
            ..Default::default()
        };
        match (ip, qtype) {
            (IpAddr::V4(_), RecordType::A) | (IpAddr::V6(_), RecordType::AAAA) => {
                serv.new_address(name, ip).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn serve_apex(&self, state: &Request<'_>, reply: &mut Message) -> Result<(), DomainError> {
        match state.qtype() {
            RecordType::SOA => {
                reply.add_answer(self.soa(&state.zone)?);
            }
            RecordType::NS => {
                let ns = self.ns_name(&state.zone);
                reply.add_answer(Record::from_rdata(
                    to_name(&state.zone)?,
                    self.ttl,
                    RData::NS(NS(to_name(&ns)?)),
                ));
                let local = state.local_ip();
                let glue = match local {
                    IpAddr::V4(_) => self.address(&ns, local, RecordType::A)?,
                    IpAddr::V6(_) => self.address(&ns, local, RecordType::AAAA)?,
                };
                if let Some(glue) = glue {
                    reply.add_additional(glue);
                }
            }
            _ => {
                reply.add_name_server(self.soa(&state.zone)?);
            }
        }
        Ok(())
    }

    /// `<apex>.<zone>` is an empty non-terminal; only `ns1` below it exists.
    fn serve_sub_apex(&self, state: &Request<'_>, reply: &mut Message) -> Result<(), DomainError> {
        let base = trim_zone(state.name(), &state.zone);
        match count_labels(&base) {
            1 => {
                reply.add_name_server(self.soa(&state.zone)?);
            }
            2 if base.starts_with("ns1.") => {
                if let Some(rr) = self.address(state.name(), state.local_ip(), state.qtype())? {
                    reply.add_answer(rr);
                } else {
                    reply.add_name_server(self.soa(&state.zone)?);
                }
            }
            _ => {
                reply.set_response_code(ResponseCode::NXDomain);
                reply.add_name_server(self.soa(&state.zone)?);
            }
        }
        Ok(())
    }

    fn serve_external(&self, state: &Request<'_>, reply: &mut Message) -> Result<(), DomainError> {
        let (services, rcode) = self.source.external(state);
        if services.is_empty() {
            reply.set_response_code(rcode);
            reply.add_name_server(self.soa(&state.zone)?);
            return Ok(());
        }

        let qname = state.qname();
        for serv in services {
            if let (HostType::A | HostType::Aaaa, Some(ip)) = serv.host_type() {
                if let Some(rr) = self.address(&qname, ip, state.qtype())? {
                    reply.add_answer(rr);
                }
            }
        }
        if reply.answers().is_empty() {
            reply.add_name_server(self.soa(&state.zone)?);
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for K8sExternal {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let mut state = Request::new(r, &*w);
            let Some(zone) = self.zones.matches(state.name()).map(str::to_string) else {
                drop(state);
                return next_or_failure(self.name(), &self.next, w, r).await;
            };
            state.zone = zone;

            let mut reply = reply_to(state.msg());
            reply
                .set_response_code(ResponseCode::NoError)
                .set_authoritative(true);

            let sub_apex = join(&[self.apex.as_str(), state.zone.as_str()]);
            if state.name() == state.zone {
                self.serve_apex(&state, &mut reply)?;
            } else if is_sub_domain(&sub_apex, state.name()) {
                self.serve_sub_apex(&state, &mut reply)?;
            } else {
                self.serve_external(&state, &mut reply)?;
            }
            state.scrub(reply)
        };

        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "k8s_external"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chaindns_application::writer::Recorder;
    use hickory_proto::op::Query;
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    struct Fixed;

    impl ExternalSource for Fixed {
        fn external(&self, state: &Request<'_>) -> (Vec<Service>, ResponseCode) {
            if state.name() == "svc1.testns.example.com." {
                (vec![Service::with_host("1.2.3.4", "/c/svc1")], ResponseCode::NoError)
            } else {
                (Vec::new(), ResponseCode::NXDomain)
            }
        }
    }

    fn plugin() -> K8sExternal {
        let config = K8sExternalConfig {
            zones: vec!["example.com.".to_string()],
            ttl: 5,
            apex: "dns".to_string(),
        };
        K8sExternal::new(&config, Arc::new(Fixed), None)
    }

    fn query(name: &str, qtype: RecordType) -> Message {
        let mut msg = Message::new();
        msg.add_query(Query::query(hickory_proto::rr::Name::from_str(name).unwrap(), qtype));
        msg
    }

    async fn run(name: &str, qtype: RecordType) -> Message {
        let mut w = Recorder::new();
        let mut r = query(name, qtype);
        plugin().serve_dns(&mut w, &mut r).await.unwrap();
        w.msg.expect("reply written")
    }

    #[tokio::test]
    async fn test_external_ip_answer() {
        let m = run("svc1.testns.example.com.", RecordType::A).await;
        assert_eq!(m.response_code(), ResponseCode::NoError);
        assert_eq!(m.answers().len(), 1);
        assert_eq!(
            m.answers()[0].data(),
            Some(&RData::A(hickory_proto::rr::rdata::A(Ipv4Addr::new(1, 2, 3, 4))))
        );
    }

    #[tokio::test]
    async fn test_missing_service_is_nxdomain_with_soa() {
        let m = run("svc9.testns.example.com.", RecordType::A).await;
        assert_eq!(m.response_code(), ResponseCode::NXDomain);
        assert_eq!(m.name_servers()[0].record_type(), RecordType::SOA);
    }

    #[tokio::test]
    async fn test_apex_ns_has_glue() {
        let m = run("example.com.", RecordType::NS).await;
        assert_eq!(m.answers()[0].record_type(), RecordType::NS);
        assert_eq!(m.additionals()[0].name().to_ascii(), "ns1.dns.example.com.");
    }

    #[tokio::test]
    async fn test_sub_apex() {
        let m = run("dns.example.com.", RecordType::A).await;
        assert_eq!(m.response_code(), ResponseCode::NoError);
        assert!(m.answers().is_empty());

        let m = run("foo.ns1.dns.example.com.", RecordType::A).await;
        assert_eq!(m.response_code(), ResponseCode::NXDomain);

        let m = run("ns1.dns.example.com.", RecordType::A).await;
        assert_eq!(m.answers().len(), 1);
    }
}
