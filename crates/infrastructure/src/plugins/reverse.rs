//! PTR answers for whole networks from a host name template, and the
//! forward lookups that template produces.
//!
//! With the template `ip-{ip}.example.org.`, `10.1.1.23` maps to
//! `ip-10.1.1.23.example.org.` and back. IPv6 addresses use 32 hex digits.

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, ResponseWriter};
use chaindns_application::{next_or_failure, Next, Request};
use chaindns_domain::config::ReverseConfig;
use chaindns_domain::dnsutil::{
    extract_address_from_reverse, hex_to_ipv6, ipv6_to_hex, is_sub_domain, normalize, reply_to,
    to_name,
};
use chaindns_domain::DomainError;
use fancy_regex::Regex;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, PTR};
use hickory_proto::rr::{RData, Record, RecordType};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

const IP_PLACEHOLDER: &str = "{ip}";
const MATCH_V4: &str = r"((?:(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?))";
const MATCH_V6: &str = "([0-9a-fA-F]{32})";

#[derive(Debug)]
pub struct Network {
    net: IpNetwork,
    template: String,
    /// Forward zone the template lives in.
    zone: String,
    ttl: u32,
    matcher: Regex,
}

fn quote_meta(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if r"\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Network {
    pub fn new(cidr: &str, template: &str, ttl: u32) -> Result<Self, DomainError> {
        let net: IpNetwork = cidr
            .parse()
            .map_err(|_| DomainError::InvalidCidr(cidr.to_string()))?;
        let template = normalize(template);
        let Some((head, tail)) = template.split_once(IP_PLACEHOLDER) else {
            return Err(DomainError::Config(format!(
                "template {} has no {} placeholder",
                template, IP_PLACEHOLDER
            )));
        };

        let ip_pattern = if net.is_ipv4() { MATCH_V4 } else { MATCH_V6 };
        let pattern = format!("^{}{}{}$", quote_meta(head), ip_pattern, quote_meta(tail));
        let matcher = Regex::new(&pattern)
            .map_err(|e| DomainError::Config(format!("template {}: {}", template, e)))?;

        let zone = match tail.split_once('.') {
            Some((_, zone)) if !zone.is_empty() => zone.to_string(),
            _ => ".".to_string(),
        };

        Ok(Self {
            net,
            template,
            zone,
            ttl,
            matcher,
        })
    }

    pub fn prefix(&self) -> u8 {
        self.net.prefix()
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.net.contains(ip)
    }

    /// Host name for `ip`.
    pub fn ip_to_hostname(&self, ip: IpAddr) -> String {
        let rendered = match ip {
            IpAddr::V4(v4) => v4.to_string(),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => v4.to_string(),
                None => ipv6_to_hex(v6),
            },
        };
        self.template.replacen(IP_PLACEHOLDER, &rendered, 1)
    }

    /// Address encoded in `name`, if it fits the template and the network.
    pub fn hostname_to_ip(&self, name: &str) -> Option<IpAddr> {
        let caps = self.matcher.captures(name).ok()??;
        let raw = caps.get(1)?.as_str();
        let ip = if self.net.is_ipv4() {
            IpAddr::V4(raw.parse::<Ipv4Addr>().ok()?)
        } else {
            IpAddr::V6(hex_to_ipv6(raw)?)
        };
        self.net.contains(ip).then_some(ip)
    }
}

pub struct Reverse {
    /// Most specific network first.
    networks: Vec<Network>,
    fallthrough: bool,
    next: Next,
}

impl Reverse {
    pub fn new(config: &ReverseConfig, next: Next) -> Result<Self, DomainError> {
        let mut networks = config
            .networks
            .iter()
            .map(|cidr| Network::new(cidr, &config.hostname, config.ttl))
            .collect::<Result<Vec<_>, _>>()?;
        networks.sort_by(|a, b| b.prefix().cmp(&a.prefix()));
        Ok(Self {
            networks,
            fallthrough: config.fallthrough,
            next,
        })
    }

    /// The answer for `state`, and whether one of the networks claimed the
    /// name.
    fn resolve(&self, state: &Request<'_>) -> Result<(Option<Record>, bool), DomainError> {
        let qname = to_name(&state.qname())?;
        match state.qtype() {
            RecordType::PTR => {
                let Some(ip) = extract_address_from_reverse(state.name()) else {
                    return Ok((None, false));
                };
                for n in &self.networks {
                    if n.contains(ip) {
                        let target = to_name(&n.ip_to_hostname(ip))?;
                        let rr = Record::from_rdata(qname, n.ttl, RData::PTR(PTR(target)));
                        return Ok((Some(rr), true));
                    }
                }
                Ok((None, false))
            }
            qtype @ (RecordType::A | RecordType::AAAA) => {
                let mut claimed = false;
                for n in &self.networks {
                    if !is_sub_domain(&n.zone, state.name()) {
                        continue;
                    }
                    claimed = true;
                    if n.net.is_ipv4() != (qtype == RecordType::A) {
                        continue;
                    }
                    let rdata = match n.hostname_to_ip(state.name()) {
                        Some(IpAddr::V4(ip)) => RData::A(A(ip)),
                        Some(IpAddr::V6(ip)) => RData::AAAA(AAAA(ip)),
                        None => continue,
                    };
                    return Ok((Some(Record::from_rdata(qname, n.ttl, rdata)), true));
                }
                Ok((None, claimed))
            }
            _ => Ok((None, false)),
        }
    }
}

#[async_trait]
impl Handler for Reverse {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let state = Request::new(r, &*w);
            match self.resolve(&state)? {
                (Some(rr), _) => {
                    let mut reply = reply_to(state.msg());
                    reply
                        .set_response_code(ResponseCode::NoError)
                        .set_authoritative(true)
                        .set_recursion_available(true);
                    reply.add_answer(rr);
                    Some(state.scrub(reply))
                }
                (None, true) if !self.fallthrough || self.next.is_none() => {
                    debug!(qname = %state.name(), "No address in configured networks");
                    return Ok(ResponseCode::ServFail);
                }
                (None, _) => None,
            }
        };

        match reply {
            Some(reply) => {
                w.write_msg(reply).await?;
                Ok(ResponseCode::NoError)
            }
            None => next_or_failure(self.name(), &self.next, w, r).await,
        }
    }

    fn name(&self) -> &'static str {
        "reverse"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_ipv4_round_trip() {
        let n = Network::new("10.1.1.0/24", "ip-{ip}.domain.internal.", 60).unwrap();
        let ip: IpAddr = "10.1.1.23".parse().unwrap();
        let host = n.ip_to_hostname(ip);
        assert_eq!(host, "ip-10.1.1.23.domain.internal.");
        assert_eq!(n.hostname_to_ip(&host), Some(ip));
        assert_eq!(n.zone, "domain.internal.");
    }

    #[test]
    fn test_hostname_outside_network() {
        let n = Network::new("10.1.1.0/24", "ip-{ip}.domain.internal.", 60).unwrap();
        assert_eq!(n.hostname_to_ip("ip-10.1.2.23.domain.internal."), None);
        assert_eq!(n.hostname_to_ip("ip-10.1.1.23.elsewhere.internal."), None);
        assert_eq!(n.hostname_to_ip("ip-10.1.1.300.domain.internal."), None);
    }

    #[test]
    fn test_ipv6_round_trip() {
        let n = Network::new("fd01::/64", "ip-{ip}.v6.internal.", 60).unwrap();
        let ip = IpAddr::V6("fd01::1:2".parse::<Ipv6Addr>().unwrap());
        let host = n.ip_to_hostname(ip);
        assert_eq!(host, "ip-fd010000000000000000000000010002.v6.internal.");
        assert_eq!(n.hostname_to_ip(&host), Some(ip));
    }

    #[test]
    fn test_most_specific_network_first() {
        let config = ReverseConfig {
            networks: vec!["10.0.0.0/8".to_string(), "10.1.1.0/24".to_string()],
            hostname: "ip-{ip}.domain.internal.".to_string(),
            ttl: 60,
            fallthrough: false,
        };
        let plugin = Reverse::new(&config, None).unwrap();
        assert_eq!(plugin.networks[0].prefix(), 24);
    }
}
