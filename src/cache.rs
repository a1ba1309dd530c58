//! Resolved-address cache with TTL-based expiration.

use rustc_hash::FxHashMap;
use std::net::IpAddr;
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Time resolved addresses stay valid before requiring re-resolution.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedResolution {
    addresses: Vec<IpAddr>,
    resolved_at: Instant,
}

/// TTL-based cache of hostname resolutions.
///
/// Entries live in process memory only; a re-resolution supersedes the old
/// entry rather than merging with it. Readers and writers from concurrent
/// resolutions are synchronized with a reader/writer lock.
pub struct ResolveCache {
    entries: RwLock<FxHashMap<String, CachedResolution>>,
    ttl: Duration,
}

impl ResolveCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            ttl,
        }
    }

    /// Look up a non-expired entry for `hostname`.
    ///
    /// Expired entries are treated as absent and removed on the way out so
    /// the map does not accumulate dead hostnames.
    pub fn get(&self, hostname: &str) -> Option<Vec<IpAddr>> {
        let now = Instant::now();

        {
            let Ok(entries) = self.entries.read() else {
                return None;
            };
            if let Some(entry) = entries.get(hostname) {
                if now.duration_since(entry.resolved_at) <= self.ttl {
                    return Some(entry.addresses.clone());
                }
            } else {
                return None;
            }
        }

        let Ok(mut entries) = self.entries.write() else {
            return None;
        };
        if let Some(entry) = entries.get(hostname) {
            if now.duration_since(entry.resolved_at) > self.ttl {
                entries.remove(hostname);
            }
        }
        None
    }

    /// Store a resolution, superseding any previous entry for the hostname.
    pub fn insert(&self, hostname: &str, addresses: Vec<IpAddr>) {
        let Ok(mut entries) = self.entries.write() else {
            return;
        };
        entries.insert(
            hostname.to_string(),
            CachedResolution {
                addresses,
                resolved_at: Instant::now(),
            },
        );
    }

    /// Drop every cached entry. Safe to call while resolutions are in flight.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
