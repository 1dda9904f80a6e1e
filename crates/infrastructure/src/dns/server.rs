use async_trait::async_trait;
use chaindns_application::client_write;
use chaindns_application::ports::{Handler, MetricsSink, ResponseWriter, Transport};
use chaindns_domain::dnsutil::reply_to;
use chaindns_domain::DomainError;
use hickory_proto::op::{Header, Message, MessageType, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Entry point from the listeners: decodes a query, runs it through the chain
/// and encodes whatever should go back to the client.
pub struct DnsServerHandler {
    chain: Arc<dyn Handler>,
    metrics: Arc<dyn MetricsSink>,
    server: String,
}

impl DnsServerHandler {
    pub fn new(chain: Arc<dyn Handler>, metrics: Arc<dyn MetricsSink>, local: SocketAddr) -> Self {
        Self {
            chain,
            metrics,
            server: format!("dns://{}", local),
        }
    }

    /// Returns the encoded reply, or `None` when the datagram is not worth
    /// answering.
    pub async fn handle_request(
        &self,
        bytes: &[u8],
        remote: SocketAddr,
        local: SocketAddr,
        transport: Transport,
    ) -> Option<Vec<u8>> {
        self.metrics.increment_counter(
            "dns_requests_total",
            &[("server", &self.server), ("proto", transport.as_str())],
        );

        let mut request = match Message::from_vec(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!(client = %remote, error = %e, "Failed to parse request");
                return self.encode(format_error(bytes)?);
            }
        };

        if request.message_type() != MessageType::Query || request.queries().len() != 1 {
            debug!(client = %remote, questions = request.queries().len(), "Malformed query");
            let mut reply = reply_to(&request);
            reply.set_response_code(ResponseCode::FormErr);
            return self.encode(reply);
        }

        let mut w = BufferedWriter::new(remote, local, transport);
        let reply = match self.chain.serve_dns(&mut w, &mut request).await {
            Ok(rcode) if client_write(rcode) => match w.msg.take() {
                Some(msg) => msg,
                None => {
                    warn!(rcode = %rcode, plugin = self.chain.name(), "Chain reported a write but produced no message");
                    error_response(&request, ResponseCode::ServFail)
                }
            },
            Ok(rcode) => {
                debug!(rcode = %rcode, qname = %request.queries()[0].name(), "Chain wrote nothing");
                error_response(&request, rcode)
            }
            Err(e) => {
                error!(qname = %request.queries()[0].name(), error = %e, "Query resolution failed");
                error_response(&request, ResponseCode::ServFail)
            }
        };

        self.encode(reply)
    }

    fn encode(&self, reply: Message) -> Option<Vec<u8>> {
        self.metrics.increment_counter(
            "dns_responses_total",
            &[("rcode", &reply.response_code().to_string())],
        );
        match reply.to_vec() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(error = %e, "Failed to encode response");
                None
            }
        }
    }
}

fn error_response(request: &Message, code: ResponseCode) -> Message {
    let mut reply = reply_to(request);
    reply
        .set_response_code(code)
        .set_recursion_available(true);
    reply
}

// FORMERR keyed on whatever id the datagram carries.
fn format_error(bytes: &[u8]) -> Option<Message> {
    if bytes.len() < 2 {
        return None;
    }
    let mut header = Header::new();
    header
        .set_id(u16::from_be_bytes([bytes[0], bytes[1]]))
        .set_message_type(MessageType::Response)
        .set_response_code(ResponseCode::FormErr);
    let mut msg = Message::new();
    msg.set_header(header);
    Some(msg)
}

/// Keeps the single message a chain writes, for the listener to send.
struct BufferedWriter {
    remote: SocketAddr,
    local: SocketAddr,
    transport: Transport,
    msg: Option<Message>,
}

impl BufferedWriter {
    fn new(remote: SocketAddr, local: SocketAddr, transport: Transport) -> Self {
        Self {
            remote,
            local,
            transport,
            msg: None,
        }
    }
}

#[async_trait]
impl ResponseWriter for BufferedWriter {
    async fn write_msg(&mut self, msg: Message) -> Result<(), DomainError> {
        if self.msg.is_some() {
            return Err(DomainError::WriteFailed(
                "response already written".to_string(),
            ));
        }
        self.msg = Some(msg);
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    fn transport(&self) -> Transport {
        self.transport
    }
}
