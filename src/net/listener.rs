//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Describe a binding (`ConnectTo`): address, port, TLS, multi-listener flag
//! - Bind, optionally with `SO_REUSEADDR`/`SO_REUSEPORT` so workers share a port
//! - Enforce max_connections via semaphore
//! - Accept incoming TCP connections

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;
use crate::net::tls::SecurityContext;

const BACKLOG: i32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Failed to resolve {address}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to load TLS material: {0}")]
    Tls(#[source] std::io::Error),
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    #[error("Listener closed")]
    Closed,
}

/// Where and how a server listens.
#[derive(Debug, Clone)]
pub struct ConnectTo {
    pub address: String,
    pub port: u16,
    pub security: Option<SecurityContext>,
    /// Share the port with other sockets bound the same way.
    pub multi: bool,
    pub max_connections: usize,
}

impl ConnectTo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            security: None,
            multi: false,
            max_connections: 10_000,
        }
    }

    pub fn with_tls(mut self, security: SecurityContext) -> Self {
        self.security = Some(security);
        self
    }

    pub fn multi(mut self, multi: bool) -> Self {
        self.multi = multi;
        self
    }

    pub fn max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Build a binding from its config section, loading TLS material if configured.
    pub async fn from_config(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let mut binding = Self::new(config.address.clone(), config.port)
            .multi(config.multi)
            .max_connections(config.max_connections);
        if let Some(tls) = &config.tls {
            let security = SecurityContext::from_pem_files(Path::new(&tls.cert_path), Path::new(&tls.key_path))
                .await
                .map_err(ListenerError::Tls)?;
            binding = binding.with_tls(security);
        }
        Ok(binding)
    }

    async fn resolve(&self) -> Result<SocketAddr, ListenerError> {
        let address_error = |source| ListenerError::Address {
            address: format!("{}:{}", self.address, self.port),
            source,
        };
        tokio::net::lookup_host((self.address.as_str(), self.port))
            .await
            .map_err(address_error)?
            .next()
            .ok_or_else(|| address_error(std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses")))
    }
}

/// A bound TCP listener that limits concurrent connections.
///
/// When the limit is reached, `accept` waits until a slot is released.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    connection_limit: Arc<Semaphore>,
    security: Option<SecurityContext>,
}

impl Listener {
    pub async fn bind(binding: &ConnectTo) -> Result<Self, ListenerError> {
        let addr = binding.resolve().await?;
        let bind_error = |source| ListenerError::Bind { addr, source };

        let inner = if binding.multi {
            shared_listener(addr).map_err(bind_error)?
        } else {
            TcpListener::bind(addr).await.map_err(bind_error)?
        };
        let local_addr = inner.local_addr().map_err(bind_error)?;

        tracing::info!(
            address = %local_addr,
            tls = binding.security.is_some(),
            multi = binding.multi,
            max_connections = binding.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            local_addr,
            connection_limit: Arc::new(Semaphore::new(binding.max_connections)),
            security: binding.security.clone(),
        })
    }

    /// Accept a connection once a slot is free.
    ///
    /// The permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = Arc::clone(&self.connection_limit)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    pub(crate) fn tls_acceptor(&self) -> Option<tokio_rustls::TlsAcceptor> {
        self.security.as_ref().map(SecurityContext::acceptor)
    }
}

/// Bind with address and port reuse so several listeners can share `addr`.
fn shared_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;
    TcpListener::from_std(socket.into())
}

/// A connection slot; released back to the listener on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let listener = Listener::bind(&ConnectTo::new("127.0.0.1", 0)).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert!(listener.tls_acceptor().is_none());
    }

    #[tokio::test]
    async fn occupied_port_is_a_bind_error() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = held.local_addr().unwrap().port();
        let err = Listener::bind(&ConnectTo::new("127.0.0.1", port)).await.err().unwrap();
        assert!(matches!(err, ListenerError::Bind { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multi_listeners_share_a_port() {
        let first = Listener::bind(&ConnectTo::new("127.0.0.1", 0).multi(true)).await.unwrap();
        let port = first.local_addr().port();
        let second = Listener::bind(&ConnectTo::new("127.0.0.1", port).multi(true)).await.unwrap();
        assert_eq!(second.local_addr().port(), port);
    }

    #[tokio::test]
    async fn permit_is_held_per_connection() {
        let listener = Listener::bind(&ConnectTo::new("127.0.0.1", 0).max_connections(2)).await.unwrap();
        let addr = listener.local_addr();
        let _client = tokio::net::TcpStream::connect(addr).await.unwrap();

        let (_stream, _peer, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);
        drop(permit);
        assert_eq!(listener.available_permits(), 2);
    }
}
