//! Multi-strategy DNS-over-HTTPS resolution.
//!
//! A resolution walks an ordered strategy chain until one succeeds:
//! 1. Provider JSON API (GET with query parameters)
//! 2. Provider wire-format API (RFC 8484 POST)
//! 3. System resolver
//!
//! Successful resolutions populate the cache; total exhaustion of the chain
//! yields an empty address list, never an error.

use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::{DEFAULT_CACHE_TTL, ResolveCache};
use crate::dns;
use crate::error::ResolveError;
use crate::provider::Provider;
use crate::stats::{Stats, StatsSnapshot};

const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on one resolution across the whole strategy chain, so a
/// slow-but-alive upstream cannot pin a client for the sum of the
/// per-request timeouts.
const RESOLVE_DEADLINE: Duration = Duration::from_secs(15);

const DNS_JSON_CONTENT_TYPE: &str = "application/dns-json";
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

const TYPE_AAAA: u16 = 28;

/// One way of turning a hostname into addresses.
///
/// Strategies are stateless with respect to the active provider; the
/// resolver hands each attempt the provider snapshot taken when the
/// resolution started.
#[async_trait]
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn attempt(
        &self,
        hostname: &str,
        provider: Provider,
    ) -> Result<Vec<IpAddr>, ResolveError>;
}

/// GET `<json-endpoint>?name=<host>&type=A&do=false&cd=false`.
struct JsonApiStrategy {
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct JsonReply {
    #[serde(rename = "Answer", default)]
    answer: Vec<JsonAnswer>,
}

#[derive(Deserialize)]
struct JsonAnswer {
    #[serde(rename = "type")]
    rtype: u16,
    data: String,
}

/// Keep A/AAAA entries whose data is an IP literal. CNAME targets and other
/// non-address data fail the parse and drop out; the chase is not performed.
fn addresses_from_json(reply: &JsonReply) -> Vec<IpAddr> {
    reply
        .answer
        .iter()
        .filter(|a| a.rtype == dns::TYPE_A || a.rtype == TYPE_AAAA)
        .filter_map(|a| a.data.parse().ok())
        .collect()
}

#[async_trait]
impl ResolveStrategy for JsonApiStrategy {
    fn name(&self) -> &'static str {
        "json-api"
    }

    async fn attempt(
        &self,
        hostname: &str,
        provider: Provider,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let Some(url) = provider.json_url() else {
            return Err(ResolveError::Unsupported);
        };

        let response = self
            .http
            .get(url)
            .query(&[
                ("name", hostname),
                ("type", "A"),
                ("do", "false"),
                ("cd", "false"),
            ])
            .header(header::ACCEPT, DNS_JSON_CONTENT_TYPE)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolveError::UpstreamStatus(response.status().as_u16()));
        }

        let reply: JsonReply = response.json().await?;
        let addrs = addresses_from_json(&reply);
        if addrs.is_empty() {
            return Err(ResolveError::NoAnswers);
        }
        Ok(addrs)
    }
}

/// POST an RFC 1035 query packet to the provider's wire-format endpoint.
struct WireFormatStrategy {
    http: reqwest::Client,
}

#[async_trait]
impl ResolveStrategy for WireFormatStrategy {
    fn name(&self) -> &'static str {
        "wire-format"
    }

    async fn attempt(
        &self,
        hostname: &str,
        provider: Provider,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        if !provider.supports_wire() {
            return Err(ResolveError::Unsupported);
        }
        let query = dns::encode_query(hostname).ok_or(ResolveError::BadHostname)?;

        let response = self
            .http
            .post(provider.wire_url())
            .header(header::CONTENT_TYPE, DNS_MESSAGE_CONTENT_TYPE)
            .header(header::ACCEPT, DNS_MESSAGE_CONTENT_TYPE)
            .body(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ResolveError::UpstreamStatus(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        let addrs = dns::parse_response(&body);
        if addrs.is_empty() {
            return Err(ResolveError::NoAnswers);
        }
        Ok(addrs.into_iter().map(IpAddr::V4).collect())
    }
}

/// Platform resolver via getaddrinfo, which tokio runs off the async
/// context. Provider-independent.
struct SystemStrategy;

#[async_trait]
impl ResolveStrategy for SystemStrategy {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn attempt(
        &self,
        hostname: &str,
        _provider: Provider,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host((hostname, 0))
            .await?
            .map(|sock| sock.ip())
            .collect();
        if addrs.is_empty() {
            return Err(ResolveError::NoAnswers);
        }
        Ok(addrs)
    }
}

/// DoH resolver with a fallback chain and a TTL cache.
pub struct DohResolver {
    provider: RwLock<Provider>,
    cache: ResolveCache,
    strategies: Vec<Arc<dyn ResolveStrategy>>,
    stats: Stats,
    deadline: Duration,
}

impl DohResolver {
    /// Build a resolver with the default strategy chain.
    ///
    /// Fails only if the HTTP client cannot be constructed.
    pub fn new(provider: Provider) -> Result<Self, ResolveError> {
        Self::with_cache_ttl(provider, DEFAULT_CACHE_TTL)
    }

    pub fn with_cache_ttl(provider: Provider, cache_ttl: Duration) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .build()?;

        let strategies: Vec<Arc<dyn ResolveStrategy>> = vec![
            Arc::new(JsonApiStrategy { http: http.clone() }),
            Arc::new(WireFormatStrategy { http }),
            Arc::new(SystemStrategy),
        ];
        Ok(Self::with_strategies(provider, cache_ttl, strategies))
    }

    /// Build a resolver over an explicit strategy chain. This is the seam
    /// tests use to run the chain against mock strategies.
    pub fn with_strategies(
        provider: Provider,
        cache_ttl: Duration,
        strategies: Vec<Arc<dyn ResolveStrategy>>,
    ) -> Self {
        Self {
            provider: RwLock::new(provider),
            cache: ResolveCache::new(cache_ttl),
            strategies,
            stats: Stats::new(),
            deadline: RESOLVE_DEADLINE,
        }
    }

    /// Override the overall per-resolution deadline.
    pub fn with_resolve_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Resolve a hostname to addresses. Never errors; an empty result means
    /// every strategy failed.
    pub async fn resolve(&self, hostname: &str) -> Vec<IpAddr> {
        let start = Instant::now();

        if let Some(addrs) = self.cache.get(hostname) {
            debug!(hostname, "cache hit");
            self.stats.record_cache_hit(elapsed_us(start));
            return addrs;
        }

        let provider = self.provider();

        match tokio::time::timeout(self.deadline, self.run_chain(hostname, provider)).await {
            Ok(Some((addrs, strategy))) => {
                self.cache.insert(hostname, addrs.clone());
                self.stats.record_resolved(strategy, elapsed_us(start));
                addrs
            }
            Ok(None) => {
                warn!(hostname, %provider, "all resolution strategies failed");
                self.stats.record_failure(elapsed_us(start));
                Vec::new()
            }
            Err(_) => {
                warn!(hostname, "resolution deadline exceeded");
                self.stats.record_failure(elapsed_us(start));
                Vec::new()
            }
        }
    }

    async fn run_chain(
        &self,
        hostname: &str,
        provider: Provider,
    ) -> Option<(Vec<IpAddr>, &'static str)> {
        for strategy in &self.strategies {
            match strategy.attempt(hostname, provider).await {
                Ok(addrs) if !addrs.is_empty() => {
                    debug!(
                        hostname,
                        strategy = strategy.name(),
                        count = addrs.len(),
                        "resolved"
                    );
                    return Some((addrs, strategy.name()));
                }
                Ok(_) => {
                    debug!(hostname, strategy = strategy.name(), "empty result");
                }
                Err(ResolveError::Unsupported) => {}
                Err(e) => {
                    debug!(hostname, strategy = strategy.name(), error = %e, "strategy failed");
                }
            }
        }
        None
    }

    /// Switch the active provider. The cache is cleared unconditionally so
    /// entries resolved through the old upstream are never served under the
    /// new one. In-flight resolutions finish against the provider they
    /// snapshotted at entry.
    pub fn set_provider(&self, provider: Provider) {
        *self
            .provider
            .write()
            .unwrap_or_else(|e| e.into_inner()) = provider;
        self.cache.clear();
    }

    pub fn provider(&self) -> Provider {
        *self.provider.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}

fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedStrategy {
        name: &'static str,
        addrs: Vec<IpAddr>,
        calls: AtomicU64,
    }

    impl FixedStrategy {
        fn new(name: &'static str, addrs: Vec<IpAddr>) -> Arc<Self> {
            Arc::new(Self {
                name,
                addrs,
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResolveStrategy for FixedStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            _hostname: &str,
            _provider: Provider,
        ) -> Result<Vec<IpAddr>, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.addrs.is_empty() {
                Err(ResolveError::NoAnswers)
            } else {
                Ok(self.addrs.clone())
            }
        }
    }

    struct SlowStrategy;

    #[async_trait]
    impl ResolveStrategy for SlowStrategy {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn attempt(
            &self,
            _hostname: &str,
            _provider: Provider,
        ) -> Result<Vec<IpAddr>, ResolveError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Err(ResolveError::NoAnswers)
        }
    }

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, last))
    }

    #[tokio::test]
    async fn chain_stops_at_first_success() {
        let failing = FixedStrategy::new("failing", vec![]);
        let first = FixedStrategy::new("first", vec![ip(1)]);
        let second = FixedStrategy::new("second", vec![ip(2)]);
        let chain: Vec<Arc<dyn ResolveStrategy>> =
            vec![failing.clone(), first.clone(), second.clone()];
        let resolver =
            DohResolver::with_strategies(Provider::Cloudflare, DEFAULT_CACHE_TTL, chain);

        let addrs = resolver.resolve("example.com").await;

        assert_eq!(addrs, vec![ip(1)]);
        assert_eq!(failing.calls(), 1);
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_empty() {
        let failing = FixedStrategy::new("failing", vec![]);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![failing.clone()];
        let resolver = DohResolver::with_strategies(Provider::Quad9, DEFAULT_CACHE_TTL, chain);

        let addrs = resolver.resolve("nonexistent.invalid").await;

        assert!(addrs.is_empty());
        assert_eq!(resolver.cache_len(), 0);
    }

    #[tokio::test]
    async fn second_resolve_is_served_from_cache() {
        let strategy = FixedStrategy::new("fixed", vec![ip(1)]);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![strategy.clone()];
        let resolver =
            DohResolver::with_strategies(Provider::Cloudflare, DEFAULT_CACHE_TTL, chain);

        let first = resolver.resolve("example.com").await;
        let second = resolver.resolve("example.com").await;

        assert_eq!(first, second);
        assert_eq!(strategy.calls(), 1);

        let snapshot = resolver.stats_snapshot_and_reset();
        assert_eq!(snapshot.queries, 2);
        assert_eq!(snapshot.cache_hits, 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_requery() {
        let strategy = FixedStrategy::new("fixed", vec![ip(1)]);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![strategy.clone()];
        let resolver = DohResolver::with_strategies(Provider::Cloudflare, Duration::ZERO, chain);

        resolver.resolve("example.com").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        resolver.resolve("example.com").await;

        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn set_provider_clears_cache() {
        let strategy = FixedStrategy::new("fixed", vec![ip(1)]);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![strategy.clone()];
        let resolver =
            DohResolver::with_strategies(Provider::Cloudflare, DEFAULT_CACHE_TTL, chain);

        resolver.resolve("example.com").await;
        assert_eq!(resolver.cache_len(), 1);

        resolver.set_provider(Provider::Google);

        assert_eq!(resolver.provider(), Provider::Google);
        assert_eq!(resolver.cache_len(), 0);

        resolver.resolve("example.com").await;
        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn clear_cache_forces_requery() {
        let strategy = FixedStrategy::new("fixed", vec![ip(1)]);
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![strategy.clone()];
        let resolver =
            DohResolver::with_strategies(Provider::Cloudflare, DEFAULT_CACHE_TTL, chain);

        resolver.resolve("example.com").await;
        resolver.clear_cache();
        resolver.resolve("example.com").await;

        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn deadline_bounds_a_hung_strategy() {
        let chain: Vec<Arc<dyn ResolveStrategy>> = vec![Arc::new(SlowStrategy)];
        let resolver = DohResolver::with_strategies(Provider::Cloudflare, DEFAULT_CACHE_TTL, chain)
            .with_resolve_deadline(Duration::from_millis(20));

        let addrs = resolver.resolve("example.com").await;

        assert!(addrs.is_empty());
    }

    #[test]
    fn json_answers_keep_only_ip_literals() {
        let reply: JsonReply = serde_json::from_str(
            r#"{
                "Status": 0,
                "Answer": [
                    {"name": "example.com.", "type": 5, "TTL": 300, "data": "alias.example.net."},
                    {"name": "example.com.", "type": 1, "TTL": 300, "data": "93.184.216.34"},
                    {"name": "example.com.", "type": 28, "TTL": 300, "data": "2606:2800:220:1::1946"},
                    {"name": "example.com.", "type": 16, "TTL": 300, "data": "\"v=spf1 -all\""}
                ]
            }"#,
        )
        .unwrap();

        let addrs = addresses_from_json(&reply);

        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[0], "93.184.216.34".parse::<IpAddr>().unwrap());
        assert_eq!(addrs[1], "2606:2800:220:1::1946".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn json_reply_without_answers_is_empty() {
        let reply: JsonReply = serde_json::from_str(r#"{"Status": 3}"#).unwrap();
        assert!(addresses_from_json(&reply).is_empty());
    }
}
