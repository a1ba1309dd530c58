//! TCP listener for the local DNS service.
//!
//! DNS over TCP prefixes each message with a 2-byte big-endian length. Each
//! accepted connection reads one query, answers it through the resolver,
//! writes the framed response, and closes.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use futures::future::{AbortHandle, Abortable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::{
    ConnectionTable, ListenerState, MAX_QUERY_SIZE, StateCell, answer_query, require_loopback,
};
use crate::resolver::DohResolver;

/// TCP front end of the proxy. Same lifecycle and connection tracking as
/// the UDP listener.
pub struct TcpProxyListener {
    addr: SocketAddr,
    resolver: Arc<DohResolver>,
    state: StateCell,
    connections: Arc<ConnectionTable>,
    active: Mutex<Option<Active>>,
}

struct Active {
    local_addr: SocketAddr,
    accept_abort: AbortHandle,
}

impl TcpProxyListener {
    pub fn new(addr: SocketAddr, resolver: Arc<DohResolver>) -> Self {
        Self {
            addr,
            resolver,
            state: StateCell::new(),
            connections: Arc::new(ConnectionTable::new()),
            active: Mutex::new(None),
        }
    }

    /// Bind and start accepting. Fatal on bind failure; the listener stays
    /// `Stopped`.
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

        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state.set(ListenerState::Stopped);
                return Err(e);
            }
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                self.state.set(ListenerState::Stopped);
                return Err(e);
            }
        };

        let (accept_abort, registration) = AbortHandle::new_pair();
        tokio::spawn(Abortable::new(
            accept_loop(listener, self.resolver.clone(), self.connections.clone()),
            registration,
        ));

        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(Active {
            local_addr,
            accept_abort,
        });
        self.state.set(ListenerState::Running);
        info!(%local_addr, "tcp listener running");
        Ok(())
    }

    /// Stop accepting and cancel every in-flight connection. No-op when
    /// already stopped.
    pub fn stop(&self) {
        if self.state.get() == ListenerState::Stopped {
            return;
        }
        self.state.set(ListenerState::Stopping);

        if let Some(active) = self.active.lock().unwrap_or_else(|e| e.into_inner()).take() {
            active.accept_abort.abort();
        }
        self.connections.abort_all();

        self.state.set(ListenerState::Stopped);
        info!("tcp listener stopped");
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

impl Drop for TcpProxyListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept loop: spawns a tracked handler task per connection.
async fn accept_loop(
    listener: TcpListener,
    resolver: Arc<DohResolver>,
    connections: Arc<ConnectionTable>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "tcp accept error");
                continue;
            }
        };

        if !peer.ip().is_loopback() {
            debug!(%peer, "dropping connection from non-local client");
            continue;
        }

        let (id, registration) = connections.register();
        let resolver = resolver.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            let _ = Abortable::new(handle_connection(stream, resolver), registration).await;
            connections.deregister(id);
        });
    }
}

/// Read one framed query, answer it, write the framed response, close.
async fn handle_connection(mut stream: TcpStream, resolver: Arc<DohResolver>) {
    let Some(query) = read_query(&mut stream).await else {
        return;
    };

    let Some(response) = answer_query(&resolver, &query).await else {
        return;
    };

    let mut framed = Vec::with_capacity(2 + response.len());
    framed.extend_from_slice(&(response.len() as u16).to_be_bytes());
    framed.extend_from_slice(&response);

    if let Err(e) = stream.write_all(&framed).await {
        debug!(error = %e, "tcp send error");
    }
}

/// Read a length-prefixed DNS message, returning the body without the
/// prefix. Messages over the query ceiling are rejected.
async fn read_query(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut buf = vec![0u8; 2 + MAX_QUERY_SIZE];
    let mut total_read = 0;

    loop {
        match stream.read(&mut buf[total_read..]).await {
            Ok(0) => return None,
            Ok(n) => total_read += n,
            Err(_) => return None,
        }

        if total_read >= 2 {
            let msg_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
            if msg_len > MAX_QUERY_SIZE {
                return None;
            }
            if total_read >= 2 + msg_len {
                return Some(buf[2..2 + msg_len].to_vec());
            }
        }

        if total_read == buf.len() {
            return None;
        }
    }
}
