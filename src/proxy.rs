//! Proxy orchestration.
//!
//! Wires the resolver to the listeners and runs the service.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::provider::Provider;
use crate::resolver::DohResolver;
use crate::transport::{tcp::TcpProxyListener, udp::UdpProxyListener};

/// Configuration for the local DNS proxy.
pub struct ProxyConfig {
    /// Local address to bind (e.g., 127.0.0.1:5353)
    pub bind_addr: SocketAddr,
    /// Upstream DoH provider
    pub provider: Provider,
}

/// Run the proxy with the given configuration.
///
/// Starts UDP and TCP listeners on the bind address and answers all queries
/// through the DoH resolver. Runs indefinitely.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let resolver = Arc::new(DohResolver::new(config.provider)?);

    let udp = UdpProxyListener::new(config.bind_addr, resolver.clone());
    let tcp = TcpProxyListener::new(config.bind_addr, resolver.clone());
    udp.start().await?;
    tcp.start().await?;

    info!(
        bind_addr = %config.bind_addr,
        provider = %config.provider,
        "dns proxy listening"
    );

    // Emit a stats line every minute
    let stats_resolver = resolver.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = stats_resolver.stats_snapshot_and_reset();
            info!(
                cache = stats_resolver.cache_len(),
                queries = stats.queries,
                cache_hits = stats.cache_hits,
                json_api = stats.json_api,
                wire_format = stats.wire_format,
                system = stats.system,
                failures = stats.failures,
                avg_resolve_ms = stats.avg_resolve_ms,
                "stats"
            );
        }
    });

    // Keep running forever; the listeners stay alive in this scope.
    std::future::pending::<()>().await;

    Ok(())
}
