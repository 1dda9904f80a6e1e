use crate::ports::{ResponseWriter, Transport};
use async_trait::async_trait;
use chaindns_domain::DomainError;
use hickory_proto::op::{Message, ResponseCode};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Writer that keeps what was written, for driving a chain without a socket.
pub struct Recorder {
    remote: SocketAddr,
    local: SocketAddr,
    transport: Transport,
    pub msg: Option<Message>,
    pub writes: usize,
}

impl Recorder {
    /// UDP client `10.240.0.1:40212` talking to `127.0.0.1:53`.
    pub fn new() -> Self {
        Self::with_addrs(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 240, 0, 1)), 40212),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 53),
            Transport::Udp,
        )
    }

    pub fn with_addrs(remote: SocketAddr, local: SocketAddr, transport: Transport) -> Self {
        Self {
            remote,
            local,
            transport,
            msg: None,
            writes: 0,
        }
    }

    pub fn with_remote(remote: SocketAddr) -> Self {
        let mut rec = Self::new();
        rec.remote = remote;
        rec
    }

    /// Rcode of the written message, if any.
    pub fn rcode(&self) -> Option<ResponseCode> {
        self.msg.as_ref().map(|m| m.response_code())
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseWriter for Recorder {
    async fn write_msg(&mut self, msg: Message) -> Result<(), DomainError> {
        self.msg = Some(msg);
        self.writes += 1;
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
