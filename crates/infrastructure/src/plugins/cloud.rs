//! Zones hosted by a cloud DNS provider, served from a periodically
//! refreshed in-memory snapshot.

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, Refresher, ResponseWriter};
use chaindns_application::{next_or_failure, Next, Request};
use chaindns_domain::dnsutil::{name_to_string, normalize, reply_to};
use chaindns_domain::{DomainError, Fall, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::{RData, Record, RecordType};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CNAME_CHAIN: usize = 8;

/// Lists the record sets of provider-hosted zones.
#[async_trait]
pub trait ZoneProvider: Send + Sync {
    /// Zones this provider hosts, fully qualified.
    fn zones(&self) -> Vec<String>;

    async fn fetch(&self, zone: &str) -> Result<Vec<Record>, DomainError>;
}

#[derive(Debug, Default)]
struct ZoneData {
    soa: Option<Record>,
    by_name: FxHashMap<String, Vec<Record>>,
}

impl ZoneData {
    fn from_records(records: Vec<Record>) -> Self {
        let mut data = Self::default();
        for rr in records {
            if rr.record_type() == RecordType::SOA && data.soa.is_none() {
                data.soa = Some(rr.clone());
            }
            data.by_name
                .entry(name_to_string(rr.name()))
                .or_default()
                .push(rr);
        }
        data
    }
}

#[derive(Debug, Default)]
struct ZoneSnapshot {
    zones: FxHashMap<String, ZoneData>,
}

enum Lookup {
    Answer(Vec<Record>),
    NoData,
    NxDomain,
}

pub struct CloudDns {
    zones: Zones,
    provider: Arc<dyn ZoneProvider>,
    snapshot: RwLock<ZoneSnapshot>,
    fall: Fall,
    timeout: Duration,
    next: Next,
}

impl CloudDns {
    pub fn new(provider: Arc<dyn ZoneProvider>, fall: Fall, next: Next) -> Self {
        let zones: Vec<String> = provider.zones().iter().map(|z| normalize(z)).collect();
        Self {
            zones: Zones::new(&zones),
            provider,
            snapshot: RwLock::new(ZoneSnapshot::default()),
            fall,
            timeout: FETCH_TIMEOUT,
            next,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(data: &ZoneData, name: &str, qtype: RecordType) -> Lookup {
        let mut answers = Vec::new();
        let mut current = name.to_string();

        for _ in 0..MAX_CNAME_CHAIN {
            let Some(rrs) = data.by_name.get(&current) else {
                break;
            };
            let matching: Vec<Record> = rrs
                .iter()
                .filter(|rr| rr.record_type() == qtype)
                .cloned()
                .collect();
            if !matching.is_empty() {
                answers.extend(matching);
                return Lookup::Answer(answers);
            }
            let cname = rrs.iter().find_map(|rr| match rr.data() {
                Some(RData::CNAME(target)) => Some((rr.clone(), name_to_string(&target.0))),
                _ => None,
            });
            match cname {
                Some((rr, target)) => {
                    answers.push(rr);
                    current = target;
                }
                None => break,
            }
        }

        if !answers.is_empty() {
            return Lookup::Answer(answers);
        }
        if data.by_name.contains_key(name) {
            Lookup::NoData
        } else {
            Lookup::NxDomain
        }
    }
}

#[async_trait]
impl Refresher for CloudDns {
    async fn refresh(&self) -> Result<(), DomainError> {
        let mut fetched = Vec::new();
        let mut errors = Vec::new();

        for zone in self.zones.iter() {
            match tokio::time::timeout(self.timeout, self.provider.fetch(zone)).await {
                Ok(Ok(records)) => fetched.push((zone.to_string(), ZoneData::from_records(records))),
                Ok(Err(e)) => errors.push(format!("{}: {}", zone, e)),
                Err(_) => errors.push(format!("{}: timed out after {:?}", zone, self.timeout)),
            }
        }

        {
            let mut snapshot = self.snapshot.write().await;
            for (zone, data) in fetched {
                debug!(zone = %zone, names = data.by_name.len(), "Zone refreshed");
                snapshot.zones.insert(zone, data);
            }
        }

        if errors.is_empty() {
            info!(zones = self.zones.as_slice().len(), "Cloud zones refreshed");
            return Ok(());
        }
        warn!(failed = errors.len(), "Some cloud zones failed to refresh");
        Err(DomainError::Backend(errors.join("; ")))
    }

    fn name(&self) -> &str {
        "cloud"
    }
}

#[async_trait]
impl Handler for CloudDns {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let state = Request::new(r, &*w);
            let Some(zone) = self.zones.matches(state.name()).map(str::to_string) else {
                drop(state);
                return next_or_failure(Handler::name(self), &self.next, w, r).await;
            };

            let snapshot = self.snapshot.read().await;
            let Some(data) = snapshot.zones.get(&zone) else {
                debug!(zone = %zone, "Zone not loaded yet");
                return Ok(ResponseCode::ServFail);
            };

            let mut reply = reply_to(state.msg());
            reply.set_authoritative(true).set_recursion_available(true);
            match Self::resolve(data, state.name(), state.qtype()) {
                Lookup::Answer(answers) => {
                    reply.set_response_code(ResponseCode::NoError);
                    reply.insert_answers(answers);
                }
                Lookup::NoData => {
                    reply.set_response_code(ResponseCode::NoError);
                    reply.insert_name_servers(data.soa.iter().cloned().collect());
                }
                Lookup::NxDomain => {
                    if self.fall.through(state.name()) {
                        drop(snapshot);
                        drop(state);
                        return next_or_failure(Handler::name(self), &self.next, w, r).await;
                    }
                    reply.set_response_code(ResponseCode::NXDomain);
                    reply.insert_name_servers(data.soa.iter().cloned().collect());
                }
            }
            state.scrub(reply)
        };

        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "cloud"
    }
}
