use async_trait::async_trait;
use chaindns_domain::DomainError;
use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Udp,
    Tcp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Udp => "udp",
            Transport::Tcp => "tcp",
        }
    }
}

/// Where a plugin sends its answer. Implemented by the server sockets and by
/// decorators that capture or rewrite the answer on its way out.
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write_msg(&mut self, msg: Message) -> Result<(), DomainError>;

    fn remote_addr(&self) -> SocketAddr;

    fn local_addr(&self) -> SocketAddr;

    fn transport(&self) -> Transport;
}

/// The rcode tells the caller whether a response was already written, see
/// [`crate::chain::client_write`]. An error always means nothing was written.
pub type HandlerResult = Result<ResponseCode, DomainError>;

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult;

    fn name(&self) -> &'static str;
}
