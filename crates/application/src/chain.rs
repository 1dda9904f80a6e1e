//! How plugins hand a query to each other.

use crate::ports::{Handler, HandlerResult, ResponseWriter};
use chaindns_domain::DomainError;
use hickory_proto::op::{Message, ResponseCode};
use std::sync::Arc;
use tracing::{debug_span, Instrument};

/// The rest of the chain after a plugin.
pub type Next = Option<Arc<dyn Handler>>;

/// Calls the next handler, or fails with [`DomainError::NoNextPlugin`] when
/// `name` is the last plugin in the chain.
pub async fn next_or_failure(
    name: &str,
    next: &Next,
    w: &mut dyn ResponseWriter,
    r: &mut Message,
) -> HandlerResult {
    match next {
        Some(next) => {
            let span = debug_span!("plugin", name = next.name());
            next.serve_dns(w, r).instrument(span).await
        }
        None => Err(DomainError::NoNextPlugin(name.to_string())),
    }
}

/// Reports whether a handler returning `rcode` has already written to the
/// client. SERVFAIL, REFUSED, FORMERR and NOTIMP mean it has not.
pub fn client_write(rcode: ResponseCode) -> bool {
    !matches!(
        rcode,
        ResponseCode::ServFail
            | ResponseCode::Refused
            | ResponseCode::FormErr
            | ResponseCode::NotImp
    )
}
