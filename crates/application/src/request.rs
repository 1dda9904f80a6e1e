//! Per-query view over the incoming message and the client it came from.

use crate::ports::{ResponseWriter, Transport};
use chaindns_domain::dnsutil::{name_to_string, to_name};
use chaindns_domain::DomainError;
use hickory_proto::op::{Edns, Message, Query};
use hickory_proto::rr::{DNSClass, RecordType};
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use std::ops::{Deref, DerefMut};

const MIN_UDP_SIZE: usize = 512;
const MAX_TCP_SIZE: usize = 65535;

pub struct Request<'a> {
    msg: Cow<'a, Message>,
    remote: SocketAddr,
    local: SocketAddr,
    transport: Transport,
    name: String,
    /// Zone the owning plugin matched, empty until set.
    pub zone: String,
}

impl<'a> Request<'a> {
    pub fn new(msg: &'a Message, w: &dyn ResponseWriter) -> Self {
        Self::from_parts(
            Cow::Borrowed(msg),
            w.remote_addr(),
            w.local_addr(),
            w.transport(),
        )
    }

    pub fn from_parts(
        msg: Cow<'a, Message>,
        remote: SocketAddr,
        local: SocketAddr,
        transport: Transport,
    ) -> Self {
        let name = msg
            .queries()
            .first()
            .map(|q| name_to_string(q.name()))
            .unwrap_or_else(|| ".".to_string());
        Self {
            msg,
            remote,
            local,
            transport,
            name,
            zone: String::new(),
        }
    }

    pub fn msg(&self) -> &Message {
        &self.msg
    }

    /// Lowercased, fully-qualified query name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query name as the client sent it.
    pub fn qname(&self) -> String {
        self.msg
            .queries()
            .first()
            .map(|q| q.name().to_ascii())
            .unwrap_or_else(|| ".".to_string())
    }

    pub fn qtype(&self) -> RecordType {
        self.msg
            .queries()
            .first()
            .map(|q| q.query_type())
            .unwrap_or(RecordType::NULL)
    }

    pub fn qclass(&self) -> DNSClass {
        self.msg
            .queries()
            .first()
            .map(|q| q.query_class())
            .unwrap_or(DNSClass::IN)
    }

    pub fn ip(&self) -> IpAddr {
        self.remote.ip()
    }

    pub fn port(&self) -> u16 {
        self.remote.port()
    }

    /// 1 for IPv4 clients, 2 for IPv6.
    pub fn family(&self) -> u8 {
        if self.remote.is_ipv4() {
            1
        } else {
            2
        }
    }

    pub fn proto(&self) -> &'static str {
        self.transport.as_str()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local.ip()
    }

    pub fn local_port(&self) -> u16 {
        self.local.port()
    }

    pub fn do_bit(&self) -> bool {
        self.msg
            .extensions()
            .as_ref()
            .map(|e| e.dnssec_ok())
            .unwrap_or(false)
    }

    /// Largest response the client accepts.
    pub fn size(&self) -> usize {
        if self.transport == Transport::Tcp {
            return MAX_TCP_SIZE;
        }
        let advertised = self
            .msg
            .extensions()
            .as_ref()
            .map(|e| e.max_payload() as usize)
            .unwrap_or(MIN_UDP_SIZE);
        advertised.max(MIN_UDP_SIZE)
    }

    /// Same client, different question. Used to chase CNAME targets.
    pub fn new_with_question(
        &self,
        name: &str,
        qtype: RecordType,
    ) -> Result<Request<'static>, DomainError> {
        let mut msg = self.msg.as_ref().clone();
        let mut query = Query::query(to_name(name)?, qtype);
        query.set_query_class(self.qclass());
        msg.queries_mut().clear();
        msg.add_query(query);

        let mut state = Request::from_parts(
            Cow::Owned(msg),
            self.remote,
            self.local,
            self.transport,
        );
        state.zone = self.zone.clone();
        Ok(state)
    }

    /// Mirrors the request's EDNS0 on `reply`, or strips it when the request had
    /// none. Returns whether the request carried EDNS0.
    pub fn size_and_do(&self, reply: &mut Message) -> bool {
        match self.msg.extensions() {
            Some(edns) => {
                let mut out = Edns::new();
                out.set_max_payload(edns.max_payload().max(MIN_UDP_SIZE as u16));
                out.set_dnssec_ok(edns.dnssec_ok());
                reply.set_edns(out);
                true
            }
            None => {
                *reply.extensions_mut() = None;
                false
            }
        }
    }

    /// Fits `reply` into [`Request::size`]: extra records go first, then
    /// answers from the end. Sets TC on UDP when anything was dropped.
    pub fn scrub(&self, mut reply: Message) -> Message {
        self.size_and_do(&mut reply);
        let size = self.size();
        let mut truncated = false;

        while encoded_len(&reply) > size {
            if reply.additionals_mut().pop().is_some() {
                continue;
            }
            if reply.answers_mut().pop().is_some() {
                truncated = true;
                continue;
            }
            if reply.name_servers_mut().pop().is_some() {
                truncated = true;
                continue;
            }
            break;
        }

        if truncated && self.transport == Transport::Udp {
            reply.set_truncated(true);
        }
        reply
    }
}

fn encoded_len(msg: &Message) -> usize {
    msg.to_vec().map(|b| b.len()).unwrap_or(usize::MAX)
}

/// Rewrites the question of a message and puts the original back when
/// dropped, on every exit path.
pub struct QnameGuard<'m> {
    msg: &'m mut Message,
    original: Option<Query>,
}

impl<'m> QnameGuard<'m> {
    pub fn rewrite(msg: &'m mut Message, name: &str) -> Result<Self, DomainError> {
        let name = to_name(name)?;
        let original = msg.queries().first().cloned();
        if let Some(query) = msg.queries_mut().first_mut() {
            query.set_name(name);
        }
        Ok(Self { msg, original })
    }

    /// The question as it was before the rewrite.
    pub fn original(&self) -> Option<&Query> {
        self.original.as_ref()
    }
}

impl Deref for QnameGuard<'_> {
    type Target = Message;

    fn deref(&self) -> &Message {
        self.msg
    }
}

impl DerefMut for QnameGuard<'_> {
    fn deref_mut(&mut self) -> &mut Message {
        self.msg
    }
}

impl Drop for QnameGuard<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            if let Some(query) = self.msg.queries_mut().first_mut() {
                *query = original;
            }
        }
    }
}
