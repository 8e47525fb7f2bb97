//! The RPC server's TCP socket.
//!
//! `accept` holds a semaphore permit per connection, so at most
//! `max_connections` HTTP/2 sessions are served at once; further peers wait
//! in the kernel backlog until one closes.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

#[derive(Debug)]
pub enum ListenerError {
    /// `host:port` is malformed or could not be bound.
    Bind(std::io::Error),
    /// `accept(2)` failed, or the permit pool was closed.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "bind: {}", e),
            ListenerError::Accept(e) => write!(f, "accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

impl From<ListenerError> for crate::Error {
    fn from(e: ListenerError) -> Self {
        crate::Error::Transport(e.to_string())
    }
}

/// Bound socket plus the connection permit pool.
pub struct Listener {
    socket: TcpListener,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl Listener {
    /// Bind `config.host:port`. Port 0 picks an ephemeral port.
    pub async fn bind(config: &ListenerConfig, port: u16) -> Result<Self, ListenerError> {
        let addr: SocketAddr = format!("{}:{}", config.host, port)
            .parse()
            .map_err(|e| ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;

        let socket = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let bound = socket.local_addr().map_err(ListenerError::Bind)?;
        tracing::debug!(address = %bound, max_connections = config.max_connections, "Socket bound");

        Ok(Self {
            socket,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
        })
    }

    /// Wait for a free slot, then for the next peer.
    ///
    /// Keep the permit alive for as long as the connection is served.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let slot = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ListenerError::Accept(std::io::Error::other(e)))?;
        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        tracing::trace!(peer = %peer, free_slots = self.permits.available_permits(), "Peer accepted");
        Ok((stream, peer, ConnectionPermit { _permit: slot }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.socket.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// Returned to the pool on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}
