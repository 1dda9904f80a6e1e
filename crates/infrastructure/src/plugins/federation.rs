//! Cluster federation: `svc.ns.<fed>.svc.<zone>` answers locally when the
//! service exists here and otherwise becomes a CNAME into the federated
//! zone.

use async_trait::async_trait;
use chaindns_application::ports::{FederationFunc, Handler, HandlerResult, ResponseWriter};
use chaindns_application::writer::NonWriter;
use chaindns_application::{client_write, next_or_failure, Next, QnameGuard, Request};
use chaindns_domain::config::FederationConfig;
use chaindns_domain::dnsutil::{join, normalize, reply_to, split_labels, to_name, trim_zone};
use chaindns_domain::{DomainError, Zones};
use hickory_proto::op::{Message, ResponseCode};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub struct Federation {
    zones: Zones,
    /// Federation label to federated zone.
    federations: BTreeMap<String, String>,
    func: Arc<dyn FederationFunc>,
    next: Next,
}

impl Federation {
    pub fn new(config: &FederationConfig, func: Arc<dyn FederationFunc>, next: Next) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            federations: config
                .federations
                .iter()
                .map(|(label, zone)| (label.to_ascii_lowercase(), normalize(zone)))
                .collect(),
            func,
            next,
        }
    }

    /// Splits `name` into the name without its federation label and the
    /// label itself. The label is always second to last once the zone is
    /// trimmed.
    fn is_name_federation(&self, name: &str, zone: &str) -> Option<(String, String)> {
        let base = trim_zone(name, zone);
        let labels = split_labels(&base);
        let n = labels.len();
        if n < 2 {
            return None;
        }
        let fed = labels[n - 2];
        if !self.federations.contains_key(fed) {
            return None;
        }
        let mut rest: Vec<&str> = labels[..n - 2].to_vec();
        rest.push(labels[n - 1]);
        rest.push(zone);
        Some((join(&rest), fed.to_string()))
    }
}

#[async_trait]
impl Handler for Federation {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let plan = {
            let state = Request::new(r, &*w);
            self.zones.matches(state.name()).and_then(|zone| {
                self.is_name_federation(state.name(), zone)
                    .map(|(without, label)| (zone.to_string(), without, label, state.qname()))
            })
        };
        let Some((zone, without, label, qname)) = plan else {
            return next_or_failure(self.name(), &self.next, w, r).await;
        };

        let mut guard = QnameGuard::rewrite(r, &without)?;
        let (rcode, captured) = {
            let mut nw = NonWriter::new(&mut *w);
            let rcode = next_or_failure(self.name(), &self.next, &mut nw, &mut guard).await?;
            (rcode, nw.into_msg())
        };
        if !client_write(rcode) {
            return Ok(rcode);
        }

        let owner = to_name(&qname)?;
        let reply = match captured {
            None => {
                debug!(qname = %qname, "Nothing written by the rest of the chain");
                return Ok(ResponseCode::ServFail);
            }
            Some(mut msg) if msg.response_code() != ResponseCode::NXDomain => {
                drop(guard);
                if let Some(q) = msg.queries_mut().first_mut() {
                    q.set_name(owner.clone());
                }
                for rr in msg.answers_mut() {
                    rr.set_name(owner.clone());
                }
                let state = Request::new(r, &*w);
                state.scrub(msg)
            }
            Some(_) => {
                let service = {
                    let mut state = Request::new(&guard, &*w);
                    state.zone = zone;
                    let fzone = self
                        .federations
                        .get(&label)
                        .cloned()
                        .unwrap_or_default();
                    self.func.federations(&state, &label, &fzone)
                };
                drop(guard);
                let service = service?;

                let state = Request::new(r, &*w);
                let mut reply = reply_to(state.msg());
                reply
                    .set_response_code(ResponseCode::NoError)
                    .set_authoritative(true);
                reply.add_answer(service.new_cname(&qname, &service.host)?);
                state.scrub(reply)
            }
        };

        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "federation"
    }
}
