//! The backend-agnostic record every backend resolves a query into.

use crate::dnsutil::{fqdn, split_labels, to_name};
use crate::errors::DomainError;
use hickory_proto::rr::rdata::{A, AAAA, CNAME, MX, NS, PTR, SRV, TXT};
use hickory_proto::rr::{RData, Record};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const MAX_TXT_CHUNK: usize = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Service {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub port: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weight: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mail: bool,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub ttl: u32,
    #[serde(default, rename = "targetstrip", skip_serializing_if = "is_zero")]
    pub target_strip: i32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    /// Backend path this service was read from.
    #[serde(skip)]
    pub key: String,
}

fn is_zero(v: &i32) -> bool {
    *v == 0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// Classification of `Service::host`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    A,
    Aaaa,
    Cname,
    Txt,
}

impl Service {
    pub fn with_host(host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Classifies the host on every call; IPv4-mapped IPv6 counts as IPv4.
    pub fn host_type(&self) -> (HostType, Option<IpAddr>) {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => (HostType::A, Some(IpAddr::V4(ip))),
            Ok(IpAddr::V6(ip)) => match ip.to_ipv4_mapped() {
                Some(v4) => (HostType::A, Some(IpAddr::V4(v4))),
                None => (HostType::Aaaa, Some(IpAddr::V6(ip))),
            },
            Err(_) if self.text.is_empty() => (HostType::Cname, None),
            Err(_) => (HostType::Txt, None),
        }
    }

    pub fn new_a(&self, name: &str, ip: Ipv4Addr) -> Result<Record, DomainError> {
        Ok(Record::from_rdata(to_name(name)?, self.ttl, RData::A(A(ip))))
    }

    pub fn new_aaaa(&self, name: &str, ip: Ipv6Addr) -> Result<Record, DomainError> {
        Ok(Record::from_rdata(
            to_name(name)?,
            self.ttl,
            RData::AAAA(AAAA(ip)),
        ))
    }

    /// Address record for whichever family `ip` belongs to.
    pub fn new_address(&self, name: &str, ip: IpAddr) -> Result<Record, DomainError> {
        match ip {
            IpAddr::V4(v4) => self.new_a(name, v4),
            IpAddr::V6(v6) => self.new_aaaa(name, v6),
        }
    }

    pub fn new_cname(&self, name: &str, target: &str) -> Result<Record, DomainError> {
        Ok(Record::from_rdata(
            to_name(name)?,
            self.ttl,
            RData::CNAME(CNAME(to_name(target)?)),
        ))
    }

    pub fn new_srv(&self, name: &str, weight: u16) -> Result<Record, DomainError> {
        let target = target_strip(&fqdn(&self.host), self.target_strip);
        let srv = SRV::new(
            clamp_u16(self.priority),
            weight,
            clamp_u16(self.port),
            to_name(&target)?,
        );
        Ok(Record::from_rdata(to_name(name)?, self.ttl, RData::SRV(srv)))
    }

    pub fn new_mx(&self, name: &str) -> Result<Record, DomainError> {
        let target = target_strip(&fqdn(&self.host), self.target_strip);
        let mx = MX::new(clamp_u16(self.priority), to_name(&target)?);
        Ok(Record::from_rdata(to_name(name)?, self.ttl, RData::MX(mx)))
    }

    pub fn new_txt(&self, name: &str) -> Result<Record, DomainError> {
        Ok(Record::from_rdata(
            to_name(name)?,
            self.ttl,
            RData::TXT(TXT::new(split_text(&self.text))),
        ))
    }

    pub fn new_ptr(&self, name: &str, target: &str) -> Result<Record, DomainError> {
        Ok(Record::from_rdata(
            to_name(name)?,
            self.ttl,
            RData::PTR(PTR(to_name(target)?)),
        ))
    }

    pub fn new_ns(&self, name: &str) -> Result<Record, DomainError> {
        let target = target_strip(&fqdn(&self.host), self.target_strip);
        Ok(Record::from_rdata(
            to_name(name)?,
            self.ttl,
            RData::NS(NS(to_name(&target)?)),
        ))
    }
}

fn clamp_u16(v: i32) -> u16 {
    v.clamp(0, u16::MAX as i32) as u16
}

/// Drops the first `strip` labels of `name`. Stripping every label leaves the
/// name untouched.
pub fn target_strip(name: &str, strip: i32) -> String {
    if strip <= 0 {
        return name.to_string();
    }
    let labels = split_labels(name);
    let strip = strip as usize;
    if strip >= labels.len() {
        return name.to_string();
    }
    fqdn(&labels[strip..].join("."))
}

fn split_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if current.len() + c.len_utf8() > MAX_TXT_CHUNK {
            chunks.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Narrows a service set to a single group.
///
/// The least-deep key carrying a group decides which group survives.
/// Services without a group are always kept; two different groups at the
/// deciding depth cancel the whole set.
pub fn group(services: Vec<Service>) -> Vec<Service> {
    let Some(first) = services.first() else {
        return services;
    };

    let mut group = first.group.clone();
    let mut slashes = first.key.matches('/').count();
    let depths: Vec<usize> = services.iter().map(|s| s.key.matches('/').count()).collect();

    for (service, &depth) in services.iter().zip(&depths) {
        if depth < slashes {
            if service.group.is_empty() {
                break;
            }
            slashes = depth;
            group = service.group.clone();
        }
    }

    if group.is_empty() {
        return services;
    }

    let mut kept = Vec::with_capacity(services.len());
    for (service, depth) in services.into_iter().zip(depths) {
        if service.group.is_empty() {
            kept.push(service);
            continue;
        }
        if depth == slashes && service.group != group {
            return Vec::new();
        }
        if service.group == group {
            kept.push(service);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_type_is_derived_from_host() {
        assert_eq!(Service::with_host("10.0.0.1", "k").host_type().0, HostType::A);
        assert_eq!(Service::with_host("::ffff:10.0.0.1", "k").host_type().0, HostType::A);
        assert_eq!(Service::with_host("fd00::1", "k").host_type().0, HostType::Aaaa);
        assert_eq!(Service::with_host("www.example.org", "k").host_type().0, HostType::Cname);

        let txt = Service {
            text: "hello".into(),
            ..Default::default()
        };
        assert_eq!(txt.host_type().0, HostType::Txt);
    }

    #[test]
    fn test_target_strip() {
        assert_eq!(target_strip("a.b.example.org.", 0), "a.b.example.org.");
        assert_eq!(target_strip("a.b.example.org.", 2), "example.org.");
        assert_eq!(target_strip("example.org.", 5), "example.org.");
    }

    #[test]
    fn test_split_text_chunks() {
        let long = "x".repeat(300);
        let chunks = split_text(&long);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 255);
        assert_eq!(split_text(""), vec![String::new()]);
    }

    #[test]
    fn test_srv_uses_target_strip() {
        let svc = Service {
            host: "a.b.example.org".into(),
            port: 8080,
            priority: 10,
            target_strip: 1,
            ttl: 30,
            ..Default::default()
        };
        let rr = svc.new_srv("_http._tcp.example.org.", 50).unwrap();
        let Some(RData::SRV(srv)) = rr.data() else {
            panic!("expected SRV");
        };
        assert_eq!(srv.target().to_ascii(), "b.example.org.");
        assert_eq!(srv.port(), 8080);
        assert_eq!(srv.weight(), 50);
        assert_eq!(rr.ttl(), 30);
    }

    fn grouped(key: &str, group: &str) -> Service {
        Service {
            host: "10.0.0.1".into(),
            key: key.into(),
            group: group.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_group_keeps_winning_group_and_ungrouped() {
        let services = vec![
            grouped("/skydns/org/example/a", "g1"),
            grouped("/skydns/org/example/a/b", "g2"),
            grouped("/skydns/org/example/a/c", ""),
        ];
        let kept = group(services);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|s| s.group != "g2"));
    }

    #[test]
    fn test_group_conflict_at_same_depth_drops_all() {
        let services = vec![
            grouped("/skydns/org/example/a", "g1"),
            grouped("/skydns/org/example/b", "g2"),
        ];
        assert!(group(services).is_empty());
    }

    #[test]
    fn test_group_without_groups_is_untouched() {
        let services = vec![grouped("/skydns/a", ""), grouped("/skydns/b", "")];
        assert_eq!(group(services).len(), 2);
    }
}
