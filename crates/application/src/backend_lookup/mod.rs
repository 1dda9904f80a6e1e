//! Record synthesis shared by every backend plugin.
//!
//! Each function asks a [`ServiceBackend`](crate::ports::ServiceBackend) for
//! services and shapes them into resource records for one query type.

mod address;
mod apex;
mod error;
mod records;
mod serve;
mod srv_mx;

pub use address::{a, aaaa};
pub use apex::{ns, soa};
pub use error::backend_error;
pub use records::{cname, ptr, txt};
pub use serve::serve_backend;
pub use srv_mx::{mx, srv};

use hickory_proto::rr::Record;

/// Answer and additional sections produced by SRV, MX and NS synthesis.
#[derive(Debug, Default)]
pub struct Synthesized {
    pub records: Vec<Record>,
    pub extra: Vec<Record>,
}
