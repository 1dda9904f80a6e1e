use async_trait::async_trait;
use chaindns_domain::dnsutil::to_name;
use chaindns_domain::DomainError;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::RecordType;

/// Recursive resolver reachable over the network.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError>;

    /// Resolves `name`/`qtype` with a fresh query.
    async fn lookup(&self, name: &str, qtype: RecordType) -> Result<Message, DomainError> {
        let mut msg = Message::new();
        msg.set_id(fastrand::u16(..))
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        msg.add_query(Query::query(to_name(name)?, qtype));
        self.exchange(&msg).await
    }
}
