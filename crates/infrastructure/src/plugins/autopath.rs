//! Server-side search path completion.
//!
//! A client whose resolver would walk its search path (`nginx.ns.svc.zone`,
//! `nginx.svc.zone`, ...) gets the first non-NXDOMAIN answer in one round
//! trip, returned as a CNAME from the name it asked for.

use async_trait::async_trait;
use chaindns_application::ports::{
    AutoPather, Handler, HandlerResult, MetricsSink, ResponseWriter,
};
use chaindns_application::writer::NonWriter;
use chaindns_application::{client_write, next_or_failure, Next, QnameGuard, Request};
use chaindns_domain::config::AutopathConfig;
use chaindns_domain::dnsutil::{is_sub_domain, normalize, to_name, trim_zone};
use chaindns_domain::{DomainError, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::CNAME;
use hickory_proto::rr::{DNSClass, RData, Record};
use std::sync::Arc;
use tracing::debug;

pub struct AutoPath {
    zones: Zones,
    search: Vec<String>,
    search_from: Option<Arc<dyn AutoPather>>,
    metrics: Arc<dyn MetricsSink>,
    next: Next,
}

/// Whether `name` lies at or below the first search path entry.
fn first_in_search_path(name: &str, search: &[String]) -> bool {
    match search.first() {
        Some(first) => name == first || is_sub_domain(first, name),
        None => false,
    }
}

/// Points `original` at the first answer owned by another name and puts
/// `original` back in the question.
fn cnamer(msg: &mut Message, original: &str) -> Result<(), DomainError> {
    let owner = to_name(original)?;
    let alias = msg
        .answers()
        .iter()
        .find(|rr| !rr.name().to_ascii().eq_ignore_ascii_case(original))
        .map(|rr| (rr.name().clone(), rr.ttl()));

    if let Some((target, ttl)) = alias {
        let mut cname = Record::from_rdata(owner.clone(), ttl, RData::CNAME(CNAME(target)));
        cname.set_dns_class(DNSClass::IN);
        msg.answers_mut().insert(0, cname);
    }
    if let Some(query) = msg.queries_mut().first_mut() {
        query.set_name(owner);
    }
    Ok(())
}

impl AutoPath {
    pub fn new(
        config: &AutopathConfig,
        search_from: Option<Arc<dyn AutoPather>>,
        metrics: Arc<dyn MetricsSink>,
        next: Next,
    ) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            // An empty entry means the bare name.
            search: config
                .search
                .iter()
                .map(|s| if s.is_empty() { String::new() } else { normalize(s) })
                .collect(),
            search_from,
            metrics,
            next,
        }
    }

    fn search_path(&self, state: &Request<'_>) -> Option<Vec<String>> {
        match &self.search_from {
            Some(pather) => pather.auto_path(state),
            None => Some(self.search.clone()),
        }
    }
}

#[async_trait]
impl Handler for AutoPath {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let plan = {
            let state = Request::new(r, &*w);
            let applies = self.zones.matches(state.name()).is_some();
            match applies.then(|| self.search_path(&state)).flatten() {
                Some(search)
                    if !search.is_empty() && first_in_search_path(state.name(), &search) =>
                {
                    let base = trim_zone(state.name(), &search[0]);
                    (!base.is_empty()).then(|| (state.qname(), base, search))
                }
                _ => None,
            }
        };
        let Some((original, base, search)) = plan else {
            return next_or_failure(self.name(), &self.next, w, r).await;
        };

        let mut first: Option<(ResponseCode, Option<Message>)> = None;

        for entry in &search {
            let candidate = if entry.is_empty() {
                format!("{}.", base)
            } else {
                format!("{}.{}", base, entry)
            };

            let (rcode, captured) = {
                let mut guard = QnameGuard::rewrite(r, &candidate)?;
                let mut nw = NonWriter::new(&mut *w);
                let rcode = next_or_failure(self.name(), &self.next, &mut nw, &mut guard).await?;
                (rcode, nw.into_msg())
            };

            if first.is_none() {
                first = Some((rcode, captured.clone()));
            }
            if !client_write(rcode) {
                debug!(qname = %candidate, rcode = %rcode, "Search path walk stopped");
                return Ok(rcode);
            }
            let Some(mut msg) = captured else {
                continue;
            };
            if msg.response_code() == ResponseCode::NXDomain {
                continue;
            }

            cnamer(&mut msg, &original)?;
            w.write_msg(msg).await?;
            self.metrics.increment_counter("autopath_success_total", &[]);
            return Ok(rcode);
        }

        match first {
            Some((rcode, Some(msg))) if client_write(rcode) => {
                w.write_msg(msg).await?;
                Ok(rcode)
            }
            Some((rcode, _)) => Ok(rcode),
            None => next_or_failure(self.name(), &self.next, w, r).await,
        }
    }

    fn name(&self) -> &'static str {
        "autopath"
    }
}
