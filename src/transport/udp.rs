//! UDP listener for the local DNS service.
//!
//! Each datagram is handled on its own task: decode the question, drive the
//! resolver, send back a synthesized response (or SERVFAIL). Handler tasks
//! are registered in the connection table so shutdown can cancel them.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, Abortable};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::{
    ConnectionTable, ListenerState, MAX_QUERY_SIZE, StateCell, answer_query, require_loopback,
};
use crate::resolver::DohResolver;

/// UDP front end of the proxy.
///
/// Lifecycle: `Stopped → Starting → Running` on a successful `start`;
/// `Running → Stopping → Stopped` on `stop`. A bind failure is fatal to
/// `start` and leaves the listener `Stopped`.
pub struct UdpProxyListener {
    addr: SocketAddr,
    resolver: Arc<DohResolver>,
    state: StateCell,
    connections: Arc<ConnectionTable>,
    active: Mutex<Option<Active>>,
}

struct Active {
    local_addr: SocketAddr,
    recv_abort: AbortHandle,
}

impl UdpProxyListener {
    pub fn new(addr: SocketAddr, resolver: Arc<DohResolver>) -> Self {
        Self {
            addr,
            resolver,
            state: StateCell::new(),
            connections: Arc::new(ConnectionTable::new()),
            active: Mutex::new(None),
        }
    }

    /// Bind the socket and start serving. `Running` is published only once
    /// the bind has succeeded.
    pub async fn start(&self) -> io::Result<()> {
        if self.state.get() != ListenerState::Stopped {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "listener already started",
            ));
        }
        self.state.set(ListenerState::Starting);

        if let Err(e) = require_loopback(self.addr) {
            self.state.set(ListenerState::Stopped);
            return Err(e);
        }

        let socket = match UdpSocket::bind(self.addr).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                self.state.set(ListenerState::Stopped);
                return Err(e);
            }
        };
        let local_addr = match socket.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state.set(ListenerState::Stopped);
                return Err(e);
            }
        };

        let (recv_abort, registration) = AbortHandle::new_pair();
        tokio::spawn(Abortable::new(
            recv_loop(socket, self.resolver.clone(), self.connections.clone()),
            registration,
        ));

        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(Active {
            local_addr,
            recv_abort,
        });
        self.state.set(ListenerState::Running);
        info!(%local_addr, "udp listener running");
        Ok(())
    }

    /// Stop the listener and cancel every in-flight handler. Calling this
    /// while already stopped is a no-op.
    pub fn stop(&self) {
        if self.state.get() == ListenerState::Stopped {
            return;
        }
        self.state.set(ListenerState::Stopping);

        if let Some(active) = self.active.lock().unwrap_or_else(|e| e.into_inner()).take() {
            active.recv_abort.abort();
        }
        self.connections.abort_all();

        self.state.set(ListenerState::Stopped);
        info!("udp listener stopped");
    }

    pub fn state(&self) -> ListenerState {
        self.state.get()
    }

    pub fn active_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|active| active.local_addr)
    }
}

impl Drop for UdpProxyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive loop: one datagram in, one handler task out.
async fn recv_loop(
    socket: Arc<UdpSocket>,
    resolver: Arc<DohResolver>,
    connections: Arc<ConnectionTable>,
) {
    let mut buf = [0u8; MAX_QUERY_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "udp recv error");
                continue;
            }
        };

        if !src.ip().is_loopback() {
            debug!(%src, "dropping datagram from non-local client");
            continue;
        }

        let query = buf[..len].to_vec();
        let (id, registration) = connections.register();
        let socket = socket.clone();
        let resolver = resolver.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            let _ = Abortable::new(handle_query(socket, resolver, query, src), registration).await;
            connections.deregister(id);
        });
    }
}

async fn handle_query(
    socket: Arc<UdpSocket>,
    resolver: Arc<DohResolver>,
    query: Vec<u8>,
    src: SocketAddr,
) {
    if let Some(response) = answer_query(&resolver, &query).await {
        if let Err(e) = socket.send_to(&response, src).await {
            debug!(%src, error = %e, "udp send error");
        }
    }
}
