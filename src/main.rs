use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use shroud::provider::Provider;
use shroud::proxy::{ProxyConfig, run};

#[derive(Parser)]
#[command(name = "shroud")]
#[command(about = "Privacy focused DNS-over-HTTPS proxy", long_about = None)]
struct Args {
    /// Local port to listen on
    #[arg(short, long, default_value = "5353")]
    port: u16,

    /// Bind address (must be loopback)
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Upstream DoH provider (cloudflare, google, quad9)
    #[arg(long, default_value = "cloudflare")]
    provider: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind_addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .context("invalid bind address")?;
    let provider: Provider = args.provider.parse()?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run(ProxyConfig {
        bind_addr,
        provider,
    }))
}
