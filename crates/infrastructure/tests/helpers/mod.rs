#![allow(dead_code)]

mod cluster;
mod handlers;

pub use cluster::{cluster, cluster_config};
pub use handlers::{EchoHandler, ScriptedHandler, StaticHandler};

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(4242).set_message_type(MessageType::Query);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    msg
}

pub fn a(name: &str, ip: &str) -> Record {
    let ip: Ipv4Addr = ip.parse().unwrap();
    Record::from_rdata(Name::from_str(name).unwrap(), 303, RData::A(A(ip)))
}

pub fn aaaa(name: &str, ip: &str) -> Record {
    let ip: Ipv6Addr = ip.parse().unwrap();
    Record::from_rdata(Name::from_str(name).unwrap(), 303, RData::AAAA(AAAA(ip)))
}

pub fn owner(rr: &Record) -> String {
    rr.name().to_ascii()
}

pub fn rdata_string(rr: &Record) -> String {
    rr.data().map(|d| d.to_string()).unwrap_or_default()
}

pub fn cname_target(rr: &Record) -> Option<String> {
    match rr.data() {
        Some(RData::CNAME(c)) => Some(c.0.to_ascii()),
        _ => None,
    }
}

pub fn ptr_target(rr: &Record) -> Option<String> {
    match rr.data() {
        Some(RData::PTR(p)) => Some(p.0.to_ascii()),
        _ => None,
    }
}
