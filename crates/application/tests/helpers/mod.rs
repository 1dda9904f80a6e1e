#![allow(dead_code)]

mod mock_backend;
mod mock_handlers;

pub use mock_backend::MockBackend;
pub use mock_handlers::{ScriptedHandler, StaticHandler};

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::str::FromStr;

pub fn query(name: &str, qtype: RecordType) -> Message {
    let mut msg = Message::new();
    msg.set_id(4242).set_message_type(MessageType::Query);
    msg.add_query(Query::query(Name::from_str(name).unwrap(), qtype));
    msg
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
