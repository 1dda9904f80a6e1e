//! Wire-level plumbing: asking upstream resolvers and turning datagrams into
//! chain invocations.
pub mod server;
pub mod upstream;

pub use server::DnsServerHandler;
pub use upstream::UdpUpstream;
