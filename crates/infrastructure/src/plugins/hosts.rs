//! Answers from `/etc/hosts`-style data: inline entries plus an optional
//! file that is re-read when its modification time changes.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, Refresher, ResponseWriter};
use chaindns_application::{next_or_failure, Next, Request};
use chaindns_domain::config::HostsConfig;
use chaindns_domain::dnsutil::{extract_address_from_reverse, normalize, reply_to, to_name};
use chaindns_domain::{DomainError, Fall, Zones};
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, PTR};
use hickory_proto::rr::{RData, Record, RecordType};
use rustc_hash::FxHashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct HostsMap {
    v4: FxHashMap<String, Vec<Ipv4Addr>>,
    v6: FxHashMap<String, Vec<Ipv6Addr>>,
    names: FxHashMap<IpAddr, Vec<String>>,
}

impl HostsMap {
    /// Parses hosts file lines. Malformed lines are skipped.
    pub fn parse<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut map = Self::default();
        for line in lines {
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();
            let Some(addr) = fields.next() else {
                continue;
            };
            let Ok(ip) = addr.parse::<IpAddr>() else {
                debug!(line, "Skipping hosts line with bad address");
                continue;
            };
            for name in fields {
                map.insert(&normalize(name), ip);
            }
        }
        map
    }

    fn insert(&mut self, name: &str, ip: IpAddr) {
        match ip {
            IpAddr::V4(v4) => push_unique(self.v4.entry(name.to_string()).or_default(), v4),
            IpAddr::V6(v6) => push_unique(self.v6.entry(name.to_string()).or_default(), v6),
        }
        push_unique(self.names.entry(ip).or_default(), name.to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn has_name(&self, name: &str) -> bool {
        self.v4.contains_key(name) || self.v6.contains_key(name)
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) {
    if !list.contains(&item) {
        list.push(item);
    }
}

pub struct Hosts {
    zones: Zones,
    fall: Fall,
    ttl: u32,
    path: Option<PathBuf>,
    inline: HostsMap,
    file: ArcSwap<HostsMap>,
    mtime: Mutex<Option<SystemTime>>,
    next: Next,
}

impl Hosts {
    pub fn new(config: &HostsConfig, next: Next) -> Self {
        Self {
            zones: Zones::new(&config.zones),
            fall: Fall::from_config(config.fallthrough.as_deref()),
            ttl: config.ttl,
            path: config.path.as_ref().map(PathBuf::from),
            inline: HostsMap::parse(config.entries.iter().map(String::as_str)),
            file: ArcSwap::from_pointee(HostsMap::default()),
            mtime: Mutex::new(None),
            next,
        }
    }

    /// Whether a file reload job is needed.
    pub fn watches_file(&self) -> bool {
        self.path.is_some()
    }

    fn lookup(&self, name: &str, qtype: RecordType) -> Option<Vec<RData>> {
        let file = self.file.load();
        let maps = [&self.inline, file.as_ref()];
        if !maps.iter().any(|m| m.has_name(name)) {
            return None;
        }

        let mut out = Vec::new();
        for map in maps {
            match qtype {
                RecordType::A => {
                    for ip in map.v4.get(name).into_iter().flatten() {
                        out.push(RData::A(A(*ip)));
                    }
                }
                RecordType::AAAA => {
                    for ip in map.v6.get(name).into_iter().flatten() {
                        out.push(RData::AAAA(AAAA(*ip)));
                    }
                }
                _ => {}
            }
        }
        Some(out)
    }

    fn lookup_reverse(&self, ip: IpAddr) -> Result<Option<Vec<RData>>, DomainError> {
        let file = self.file.load();
        let mut out = Vec::new();
        for map in [&self.inline, file.as_ref()] {
            for name in map.names.get(&ip).into_iter().flatten() {
                out.push(RData::PTR(PTR(to_name(name)?)));
            }
        }
        Ok((!out.is_empty()).then_some(out))
    }
}

#[async_trait]
impl Refresher for Hosts {
    async fn refresh(&self) -> Result<(), DomainError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let modified = tokio::fs::metadata(path).await?.modified()?;
        {
            let last = self.mtime.lock().unwrap_or_else(|e| e.into_inner());
            if *last == Some(modified) {
                return Ok(());
            }
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let map = HostsMap::parse(contents.lines());
        info!(path = %path.display(), entries = map.len(), "Loaded hosts file");
        self.file.store(Arc::new(map));
        *self.mtime.lock().unwrap_or_else(|e| e.into_inner()) = Some(modified);
        Ok(())
    }

    fn name(&self) -> &str {
        "hosts"
    }
}

#[async_trait]
impl Handler for Hosts {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let state = Request::new(r, &*w);
            let name = state.name();

            let found = match extract_address_from_reverse(name) {
                Some(ip) if state.qtype() == RecordType::PTR => self.lookup_reverse(ip)?,
                Some(ip) => self.lookup_reverse(ip)?.map(|_| Vec::new()),
                None if self.zones.matches(name).is_some() => self.lookup(name, state.qtype()),
                None => None,
            };

            let Some(rdata) = found else {
                let in_zone = self.zones.matches(name).is_some()
                    || extract_address_from_reverse(name).is_some();
                if in_zone && !self.fall.through(name) {
                    // No SOA to build an NXDOMAIN from.
                    debug!(qname = %name, "Name not in hosts data");
                    return Ok(ResponseCode::ServFail);
                }
                drop(state);
                return next_or_failure(Handler::name(self), &self.next, w, r).await;
            };

            let owner = to_name(&state.qname())?;
            let mut reply = reply_to(state.msg());
            reply
                .set_response_code(ResponseCode::NoError)
                .set_authoritative(true)
                .set_recursion_available(true);
            reply.insert_answers(
                rdata
                    .into_iter()
                    .map(|rd| Record::from_rdata(owner.clone(), self.ttl, rd))
                    .collect(),
            );
            state.scrub(reply)
        };

        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "hosts"
    }
}
