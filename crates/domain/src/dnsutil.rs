//! Name helpers shared by every plugin.
//!
//! Names travel through the chain as lowercase, fully-qualified strings.
//! Conversion to wire names happens only when a record is built.

use crate::errors::DomainError;
use hickory_proto::op::{Message, MessageType};
use hickory_proto::rr::{Name, Record};
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub type Labels<'a> = SmallVec<[&'a str; 8]>;

const IP4_ARPA: &str = ".in-addr.arpa.";
const IP6_ARPA: &str = ".ip6.arpa.";

pub fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{}.", name)
    }
}

/// Lowercases and fully qualifies `name`.
pub fn normalize(name: &str) -> String {
    fqdn(&name.to_ascii_lowercase())
}

pub fn split_labels(name: &str) -> Labels<'_> {
    name.trim_end_matches('.')
        .split('.')
        .filter(|label| !label.is_empty())
        .collect()
}

pub fn count_labels(name: &str) -> usize {
    split_labels(name).len()
}

/// Reports whether `child` equals `parent` or lies below it on a label boundary.
/// Comparison is ASCII case-insensitive and does not allocate.
pub fn is_sub_domain(parent: &str, child: &str) -> bool {
    let parent = parent.trim_end_matches('.');
    let child = child.trim_end_matches('.');
    if parent.is_empty() {
        return true;
    }
    if child.len() < parent.len() {
        return false;
    }
    let cut = child.len() - parent.len();
    match (child.get(..cut), child.get(cut..)) {
        (Some(head), Some(tail)) => {
            tail.eq_ignore_ascii_case(parent) && (head.is_empty() || head.ends_with('.'))
        }
        _ => false,
    }
}

/// Strips `zone` from the end of `name` and returns what is left, without a
/// trailing dot. Returns an empty string when nothing remains.
pub fn trim_zone(name: &str, zone: &str) -> String {
    let labels = split_labels(name);
    let zone_labels = count_labels(zone);
    if labels.len() <= zone_labels {
        return String::new();
    }
    labels[..labels.len() - zone_labels].join(".")
}

/// Joins labels (each may itself contain dots) into a fully-qualified name.
pub fn join<S: AsRef<str>>(labels: &[S]) -> String {
    let mut out = String::new();
    for label in labels {
        let label = label.as_ref().trim_end_matches('.');
        if label.is_empty() {
            continue;
        }
        out.push_str(label);
        out.push('.');
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

/// Parses the address encoded in an `in-addr.arpa.` or `ip6.arpa.` name.
pub fn extract_address_from_reverse(name: &str) -> Option<IpAddr> {
    let lower = normalize(name);
    if let Some(body) = lower.strip_suffix(IP4_ARPA) {
        let mut octets: SmallVec<[&str; 4]> = body.split('.').collect();
        if octets.len() != 4 {
            return None;
        }
        octets.reverse();
        return octets.join(".").parse::<Ipv4Addr>().ok().map(IpAddr::V4);
    }
    if let Some(body) = lower.strip_suffix(IP6_ARPA) {
        let nibbles: Vec<&str> = body.split('.').collect();
        if nibbles.len() != 32 || nibbles.iter().any(|n| n.len() != 1) {
            return None;
        }
        let hex: String = nibbles.iter().rev().copied().collect();
        return hex_to_ipv6(&hex).map(IpAddr::V6);
    }
    None
}

/// Builds the reverse lookup name for `ip`.
pub fn reverse_name(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}{}", o[3], o[2], o[1], o[0], IP4_ARPA)
        }
        IpAddr::V6(v6) => {
            let hex = ipv6_to_hex(v6);
            let mut out = String::with_capacity(64 + IP6_ARPA.len());
            for c in hex.chars().rev() {
                out.push(c);
                out.push('.');
            }
            out.pop();
            out.push_str(IP6_ARPA);
            out
        }
    }
}

/// Lowercase, zero-padded, colon-free hex form of an IPv6 address.
pub fn ipv6_to_hex(ip: Ipv6Addr) -> String {
    ip.octets().iter().map(|b| format!("{:02x}", b)).collect()
}

pub fn hex_to_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let grouped: Vec<&str> = (0..8).filter_map(|i| hex.get(i * 4..i * 4 + 4)).collect();
    grouped.join(":").parse().ok()
}

pub fn to_name(name: &str) -> Result<Name, DomainError> {
    Name::from_ascii(fqdn(name))
        .map_err(|e| DomainError::InvalidDomainName(format!("{}: {}", name, e)))
}

/// Lowercased FQDN text of a wire name.
pub fn name_to_string(name: &Name) -> String {
    normalize(&name.to_ascii())
}

/// Starts a response for `req`: same id, opcode and question, RD/CD copied.
pub fn reply_to(req: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(req.id())
        .set_message_type(MessageType::Response)
        .set_op_code(req.op_code())
        .set_recursion_desired(req.recursion_desired())
        .set_checking_disabled(req.checking_disabled());
    reply.add_queries(req.queries().iter().cloned());
    reply
}

/// Removes records that share owner, type and rdata, keeping the first.
pub fn dedup(records: Vec<Record>) -> Vec<Record> {
    let mut seen = FxHashSet::default();
    records
        .into_iter()
        .filter(|r| {
            let rdata = r.data().map(|d| d.to_string()).unwrap_or_default();
            seen.insert((name_to_string(r.name()), r.record_type(), rdata))
        })
        .collect()
}
