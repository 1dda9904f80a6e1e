use chaindns_domain::CliOverrides;
use chaindns_infrastructure::dns::DnsServerHandler;
use chaindns_infrastructure::TracingMetrics;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;
mod di;
mod server;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "chaindns")]
#[command(version)]
#[command(about = "chaindns - DNS server built from a chain of plugins")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// DNS server port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_overrides = CliOverrides {
        dns_port: cli.port,
        bind_address: cli.bind.clone(),
        log_level: cli.log_level.clone(),
    };

    let config = bootstrap::load_config(cli.config.as_deref(), cli_overrides)?;
    bootstrap::init_logging(&config);

    info!("Starting chaindns v{}", env!("CARGO_PKG_VERSION"));

    let dns_addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.dns_port).parse()?;

    let metrics = Arc::new(TracingMetrics::new());
    let chain = di::ChainBuilder::new(metrics.clone()).build(&config).await.map_err(|e| {
        error!(error = %e, "Failed to build plugin chain");
        e
    })?;
    info!(plugins = %chain.names.join(" -> "), "Plugin chain ready");

    let shutdown = CancellationToken::new();
    let _jobs = chain.jobs.with_shutdown_token(shutdown.clone()).start().await;

    let handler = DnsServerHandler::new(chain.head, metrics, dns_addr);
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = server::start_dns_server(
            dns_addr,
            handler,
            config.server.udp_workers,
            config.server.tcp_idle_timeout_secs,
            server_shutdown,
        )
        .await
        {
            error!(error = %e, "DNS server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();
    server.await?;

    info!("Server shutdown complete");
    Ok(())
}
