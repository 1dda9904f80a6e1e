//! chaindns application layer: the plugin chain protocol, per-query state and
//! the record synthesis engine shared by backends.
pub mod backend_lookup;
pub mod chain;
pub mod ports;
pub mod request;
pub mod writer;

pub use chain::{client_write, next_or_failure, Next};
pub use request::{QnameGuard, Request};
