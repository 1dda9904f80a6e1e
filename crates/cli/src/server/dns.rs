use chaindns_application::ports::Transport;
use chaindns_infrastructure::dns::DnsServerHandler;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const MAX_UDP_REQUEST: usize = 4096;

pub async fn start_dns_server(
    socket_addr: SocketAddr,
    handler: DnsServerHandler,
    num_workers: usize,
    tcp_idle_timeout_secs: u64,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let domain = if socket_addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let num_workers = num_workers.max(1);

    info!(bind_address = %socket_addr, num_workers, "Starting DNS server with SO_REUSEPORT");

    let handler = Arc::new(handler);
    let mut join_set: JoinSet<()> = JoinSet::new();

    for i in 0..num_workers {
        let udp_socket = Arc::new(create_udp_socket(domain, socket_addr)?);
        let handler_udp = handler.clone();
        let udp_shutdown = shutdown.clone();
        join_set.spawn(async move {
            run_udp_worker(udp_socket, handler_udp, i, udp_shutdown).await;
        });
    }

    let tcp_listener = create_tcp_listener(domain, socket_addr)?;
    let idle = Duration::from_secs(tcp_idle_timeout_secs);
    join_set.spawn(run_tcp_listener(tcp_listener, handler, idle, shutdown));

    info!("DNS server ready, {} UDP workers on {}", num_workers, socket_addr);

    while join_set.join_next().await.is_some() {}
    info!("DNS server stopped");
    Ok(())
}

async fn run_udp_worker(
    socket: Arc<UdpSocket>,
    handler: Arc<DnsServerHandler>,
    worker_id: usize,
    shutdown: CancellationToken,
) {
    let local = match socket.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(worker = worker_id, error = %e, "UDP socket has no local address");
            return;
        }
    };
    let mut recv_buf = [0u8; MAX_UDP_REQUEST];

    loop {
        let (n, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(worker = worker_id, "UDP worker shutting down");
                break;
            }
            received = socket.recv_from(&mut recv_buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    error!(worker = worker_id, error = %e, "UDP recv error");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        let socket = socket.clone();
        let query: Arc<[u8]> = Arc::from(&recv_buf[..n]);
        tokio::spawn(async move {
            if let Some(response) = handler
                .handle_request(&query, from, local, Transport::Udp)
                .await
            {
                if let Err(e) = socket.send_to(&response, from).await {
                    debug!(client = %from, error = %e, "UDP send failed");
                }
            }
        });
    }
}

async fn run_tcp_listener(
    listener: TcpListener,
    handler: Arc<DnsServerHandler>,
    idle: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, from) = tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("TCP listener shutting down");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "TCP accept error");
                    continue;
                }
            },
        };

        let handler = handler.clone();
        let conn_shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = conn_shutdown.cancelled() => {}
                result = serve_tcp_connection(stream, from, handler, idle) => {
                    if let Err(e) = result {
                        debug!(client = %from, error = %e, "TCP connection closed");
                    }
                }
            }
        });
    }
}

/// Serves length-prefixed queries until the client goes quiet for `idle`.
async fn serve_tcp_connection(
    mut stream: TcpStream,
    from: SocketAddr,
    handler: Arc<DnsServerHandler>,
    idle: Duration,
) -> std::io::Result<()> {
    let local = stream.local_addr()?;
    loop {
        let mut len_buf = [0u8; 2];
        match tokio::time::timeout(idle, stream.read_exact(&mut len_buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(client = %from, "TCP connection idle, closing");
                return Ok(());
            }
        }

        let len = u16::from_be_bytes(len_buf) as usize;
        let mut query = vec![0u8; len];
        stream.read_exact(&mut query).await?;

        let Some(response) = handler
            .handle_request(&query, from, local, Transport::Tcp)
            .await
        else {
            continue;
        };
        let Ok(response_len) = u16::try_from(response.len()) else {
            error!(client = %from, size = response.len(), "Response too large for TCP framing");
            continue;
        };
        stream.write_all(&response_len.to_be_bytes()).await?;
        stream.write_all(&response).await?;
    }
}

fn create_udp_socket(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<UdpSocket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_recv_buffer_size(512 * 1024)?;
    socket.set_send_buffer_size(512 * 1024)?;
    socket.bind(&socket_addr.into())?;
    socket.set_nonblocking(true)?;
    let std_socket: std::net::UdpSocket = socket.into();
    Ok(UdpSocket::from_std(std_socket)?)
}

fn create_tcp_listener(domain: Domain, socket_addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if socket_addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&socket_addr.into())?;
    socket.listen(1024)?;
    socket.set_nonblocking(true)?;
    let std_listener: std::net::TcpListener = socket.into();
    Ok(TcpListener::from_std(std_listener)?)
}
