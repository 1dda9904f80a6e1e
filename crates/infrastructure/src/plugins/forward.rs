//! Terminal plugin relaying queries to recursive resolvers.

use async_trait::async_trait;
use chaindns_application::ports::{Handler, HandlerResult, ResponseWriter, Upstream};
use chaindns_application::{next_or_failure, Next, Request};
use chaindns_domain::Zones;
use hickory_proto::op::{Message, ResponseCode};
use std::sync::Arc;
use tracing::debug;

pub struct Forward {
    zones: Zones,
    upstream: Arc<dyn Upstream>,
    next: Next,
}

impl Forward {
    pub fn new(zones: &[String], upstream: Arc<dyn Upstream>, next: Next) -> Self {
        Self {
            zones: Zones::new(zones),
            upstream,
            next,
        }
    }
}

#[async_trait]
impl Handler for Forward {
    async fn serve_dns(&self, w: &mut dyn ResponseWriter, r: &mut Message) -> HandlerResult {
        let reply = {
            let state = Request::new(r, &*w);
            if self.zones.matches(state.name()).is_none() {
                drop(state);
                return next_or_failure(self.name(), &self.next, w, r).await;
            }

            let mut reply = self.upstream.exchange(state.msg()).await?;
            reply.set_id(state.msg().id());
            debug!(
                qname = %state.name(),
                rcode = %reply.response_code(),
                answers = reply.answers().len(),
                "Forwarded"
            );
            state.scrub(reply)
        };

        w.write_msg(reply).await?;
        Ok(ResponseCode::NoError)
    }

    fn name(&self) -> &'static str {
        "forward"
    }
}
