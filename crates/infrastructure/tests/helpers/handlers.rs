use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, ResponseWriter};
use chaindns_domain::dnsutil::reply_to;
use hickory_proto::op::{Message, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

/// Answers every query with the same rcode and records, counting calls.
pub struct StaticHandler {
    pub rcode: ResponseCode,
    pub answers: Vec<Record>,
    pub write: bool,
    pub calls: Arc<Mutex<usize>>,
}

impl StaticHandler {
    pub fn new(rcode: ResponseCode) -> Self {
        Self {
            rcode,
            answers: Vec::new(),
            write: true,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns `rcode` without writing anything.
    pub fn silent(rcode: ResponseCode) -> Self {
        Self {
            write: false,
            ..Self::new(rcode)
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Handler for StaticHandler {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        *self.calls.lock().unwrap() += 1;
        if self.write {
            let mut reply = reply_to(r);
            reply.set_response_code(self.rcode);
            reply.insert_answers(self.answers.clone());
            w.write_msg(reply).await?;
        }
        Ok(self.rcode)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Answers per query name; unknown names get NXDOMAIN. Records every name it
/// was asked for.
#[derive(Default)]
pub struct ScriptedHandler {
    pub answers: HashMap<String, (ResponseCode, Vec<Record>)>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedHandler {
    pub fn answer(mut self, name: &str, rcode: ResponseCode, records: Vec<Record>) -> Self {
        self.answers.insert(name.to_string(), (rcode, records));
        self
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for ScriptedHandler {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let name = r.queries()[0].name().to_ascii().to_lowercase();
        self.seen.lock().unwrap().push(name.clone());

        let (rcode, records) = self
            .answers
            .get(&name)
            .cloned()
            .unwrap_or((ResponseCode::NXDomain, Vec::new()));
        let mut reply = reply_to(r);
        reply.set_response_code(rcode);
        reply.insert_answers(records);
        w.write_msg(reply).await?;
        Ok(rcode)
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Answers `A 127.0.0.1` for whatever it is asked, owned by the question
/// it received, and keeps a copy of the last request.
#[derive(Default)]
pub struct EchoHandler {
    pub last: Arc<Mutex<Option<Message>>>,
}

impl EchoHandler {
    pub fn last(&self) -> Option<Message> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        *self.last.lock().unwrap() = Some(r.clone());
        let mut reply = reply_to(r);
        reply.set_response_code(ResponseCode::NoError);
        let owner = r.queries()[0].name().clone();
        reply.add_answer(Record::from_rdata(
            owner,
            300,
            RData::A(A(Ipv4Addr::LOCALHOST)),
        ));
        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}
