//! Upstream DNS-over-HTTPS provider catalog.

use std::fmt;
use std::str::FromStr;

/// A DoH upstream the resolver can query.
///
/// Every provider supports at least one of the two DoH APIs; the system
/// resolver fallback is available regardless of the selected provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Cloudflare,
    Google,
    Quad9,
}

impl Provider {
    /// Endpoint for the JSON query-string API, if the provider has one.
    pub fn json_url(self) -> Option<&'static str> {
        match self {
            Provider::Cloudflare => Some("https://cloudflare-dns.com/dns-query"),
            Provider::Google => Some("https://dns.google/resolve"),
            Provider::Quad9 => None,
        }
    }

    /// Endpoint for the RFC 8484 wire-format POST API.
    pub fn wire_url(self) -> &'static str {
        match self {
            Provider::Cloudflare => "https://cloudflare-dns.com/dns-query",
            Provider::Google => "https://dns.google/dns-query",
            Provider::Quad9 => "https://dns.quad9.net/dns-query",
        }
    }

    pub fn supports_json(self) -> bool {
        self.json_url().is_some()
    }

    pub fn supports_wire(self) -> bool {
        true
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::Cloudflare => "cloudflare",
            Provider::Google => "google",
            Provider::Quad9 => "quad9",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown provider '{0}' (expected cloudflare, google, or quad9)")]
pub struct UnknownProvider(String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudflare" => Ok(Provider::Cloudflare),
            "google" => Ok(Provider::Google),
            "quad9" => Ok(Provider::Quad9),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_provider_supports_an_api() {
        for provider in [Provider::Cloudflare, Provider::Google, Provider::Quad9] {
            assert!(provider.supports_json() || provider.supports_wire());
        }
    }

    #[test]
    fn quad9_is_wire_only() {
        assert!(!Provider::Quad9.supports_json());
        assert!(Provider::Quad9.supports_wire());
    }

    #[test]
    fn parses_from_str() {
        assert_eq!("cloudflare".parse::<Provider>().unwrap(), Provider::Cloudflare);
        assert_eq!("Google".parse::<Provider>().unwrap(), Provider::Google);
        assert!("opendns".parse::<Provider>().is_err());
    }
}
