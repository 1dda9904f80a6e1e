use crate::ports::{ResponseWriter, Transport};
use async_trait::async_trait;
use chaindns_domain::DomainError;
use hickory_proto::op::Message;
use std::net::SocketAddr;

/// Captures the message written by the rest of the chain instead of sending
/// it. `msg` stays `None` when nothing was written.
pub struct NonWriter<'a> {
    inner: &'a mut dyn ResponseWriter,
    msg: Option<Message>,
}

impl<'a> NonWriter<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self { inner, msg: None }
    }

    pub fn msg(&self) -> Option<&Message> {
        self.msg.as_ref()
    }

    pub fn into_msg(self) -> Option<Message> {
        self.msg
    }
}

#[async_trait]
impl ResponseWriter for NonWriter<'_> {
    async fn write_msg(&mut self, msg: Message) -> Result<(), DomainError> {
        self.msg = Some(msg);
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr()
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr()
    }

    fn transport(&self) -> Transport {
        self.inner.transport()
    }
}
