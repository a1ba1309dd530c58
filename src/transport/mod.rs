//! Listener implementations for the local DNS service.
//!
//! Provides UDP and TCP listeners that accept DNS queries from local
//! clients, drive the resolver, and send synthesized responses back.

pub mod tcp;
pub mod udp;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use futures::future::{AbortHandle, AbortRegistration};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::dns::{self, DnsQuestion};
use crate::resolver::DohResolver;

/// Practical ceiling for a UDP DNS query datagram; TCP queries are held to
/// the same bound.
pub const MAX_QUERY_SIZE: usize = 512;

/// Lifecycle of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Shared state cell so both listeners publish transitions the same way.
pub(crate) struct StateCell(RwLock<ListenerState>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(RwLock::new(ListenerState::Stopped))
    }

    pub(crate) fn get(&self) -> ListenerState {
        *self.0.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn set(&self, state: ListenerState) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

/// Registry of in-flight query tasks.
///
/// Each handler registers before it is spawned and deregisters when it
/// finishes, so the listener can report how many queries are in flight and
/// abort all of them on shutdown.
pub struct ConnectionTable {
    connections: Mutex<FxHashMap<u64, AbortHandle>>,
    next_id: AtomicU64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(FxHashMap::default()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Allocate a connection slot. The returned registration must wrap the
    /// handler future so `abort_all` can cancel it.
    pub fn register(&self) -> (u64, AbortRegistration) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (handle, registration) = AbortHandle::new_pair();
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle);
        (id, registration)
    }

    pub fn deregister(&self, id: u64) {
        self.connections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    /// Cancel every registered handler and clear the table.
    pub fn abort_all(&self) {
        let mut connections = self.connections.lock().unwrap_or_else(|e| e.into_inner());
        for handle in connections.values() {
            handle.abort();
        }
        connections.clear();
    }

    pub fn len(&self) -> usize {
        self.connections
            .lock()
            .map(|c| c.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Answer a raw DNS query through the resolver.
///
/// Decode failures and exhausted resolutions both produce a SERVFAIL so the
/// client is never left waiting; `None` means the bytes were too mangled to
/// even address a response (no usable header).
pub(crate) async fn answer_query(resolver: &DohResolver, query: &[u8]) -> Option<Vec<u8>> {
    let Some(question) = DnsQuestion::parse(query) else {
        debug!("unparseable query, answering SERVFAIL");
        return dns::synthesize_servfail(query);
    };

    let addrs = resolver.resolve(&question.hostname).await;
    if addrs.is_empty() {
        debug!(hostname = %question.hostname, "resolution failed, answering SERVFAIL");
        return dns::synthesize_servfail(query);
    }

    // Only A answers are synthesized; IPv6 results are dropped here.
    let v4: Vec<Ipv4Addr> = addrs
        .iter()
        .filter_map(|addr| match addr {
            IpAddr::V4(v4) => Some(*v4),
            IpAddr::V6(_) => None,
        })
        .collect();

    debug!(hostname = %question.hostname, answers = v4.len(), "serving response");
    dns::synthesize_response(query, &v4)
}

/// Reject non-loopback bind addresses; the proxy only serves local clients.
pub(crate) fn require_loopback(addr: SocketAddr) -> std::io::Result<()> {
    if addr.ip().is_loopback() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "listener must bind a loopback address",
        ))
    }
}
