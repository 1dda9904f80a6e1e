//! Plain DNS over UDP to a set of recursive resolvers.

use async_trait::async_trait;
use chaindns_application::ports::Upstream;
use chaindns_domain::DomainError;
use hickory_proto::op::Message;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends each query to one upstream, starting at a random server and moving
/// to the next one on failure.
#[derive(Debug, Clone)]
pub struct UdpUpstream {
    servers: Vec<SocketAddr>,
    timeout: Duration,
}

impl UdpUpstream {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration) -> Result<Self, DomainError> {
        if servers.is_empty() {
            return Err(DomainError::Config("no upstream servers".to_string()));
        }
        Ok(Self { servers, timeout })
    }

    /// Parses `ip:port` strings; a bare IP gets port 53.
    pub fn from_config(upstreams: &[String], timeout_ms: u64) -> Result<Self, DomainError> {
        let servers = upstreams
            .iter()
            .map(|s| parse_server(s))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(servers, Duration::from_millis(timeout_ms))
    }

    pub fn servers(&self) -> &[SocketAddr] {
        &self.servers
    }

    async fn exchange_with(
        &self,
        server: SocketAddr,
        msg: &Message,
    ) -> Result<Message, DomainError> {
        let bind_addr = if server.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DomainError::Backend(format!("Failed to bind UDP socket: {}", e)))?;

        let query = msg
            .to_vec()
            .map_err(|e| DomainError::Backend(format!("Failed to encode query: {}", e)))?;

        let bytes_sent = tokio::time::timeout(self.timeout, socket.send_to(&query, server))
            .await
            .map_err(|_| DomainError::Timeout(self.timeout.as_millis() as u64))?
            .map_err(|e| {
                DomainError::Backend(format!("Failed to send UDP query to {}: {}", server, e))
            })?;

        debug!(server = %server, bytes_sent = bytes_sent, "UDP query sent");

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        loop {
            let (bytes_received, from_addr) =
                tokio::time::timeout(self.timeout, socket.recv_from(&mut recv_buf))
                    .await
                    .map_err(|_| DomainError::Timeout(self.timeout.as_millis() as u64))?
                    .map_err(|e| {
                        DomainError::Backend(format!(
                            "Failed to receive UDP response from {}: {}",
                            server, e
                        ))
                    })?;

            if from_addr.ip() != server.ip() {
                warn!(expected = %server, received_from = %from_addr, "UDP response from unexpected source");
                continue;
            }

            debug!(server = %server, bytes_received = bytes_received, "UDP response received");

            let reply = Message::from_vec(&recv_buf[..bytes_received])
                .map_err(|e| DomainError::InvalidDnsResponse(e.to_string()))?;
            if reply.id() != msg.id() {
                warn!(server = %server, expected = msg.id(), got = reply.id(), "Mismatched response id");
                continue;
            }
            return Ok(reply);
        }
    }
}

#[async_trait]
impl Upstream for UdpUpstream {
    async fn exchange(&self, msg: &Message) -> Result<Message, DomainError> {
        let start = fastrand::usize(..self.servers.len());
        let mut last_err = DomainError::Backend("no upstream servers".to_string());

        for i in 0..self.servers.len() {
            let server = self.servers[(start + i) % self.servers.len()];
            match self.exchange_with(server, msg).await {
                Ok(reply) => return Ok(reply),
                Err(e) => {
                    warn!(server = %server, error = %e, "Upstream exchange failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

fn parse_server(s: &str) -> Result<SocketAddr, DomainError> {
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Ok(addr);
    }
    s.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| DomainError::InvalidIpAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_defaults_port() {
        let upstream = UdpUpstream::from_config(
            &["8.8.8.8".to_string(), "[2001:4860:4860::8888]:5353".to_string()],
            5000,
        )
        .unwrap();
        assert_eq!(upstream.servers()[0], "8.8.8.8:53".parse().unwrap());
        assert_eq!(upstream.servers()[1].port(), 5353);
    }

    #[test]
    fn test_empty_upstreams_rejected() {
        assert!(UdpUpstream::from_config(&[], 5000).is_err());
        assert!(UdpUpstream::from_config(&["not-an-ip".to_string()], 5000).is_err());
    }
}
