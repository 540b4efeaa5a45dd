//! Listener set of one server.
//!
//! # Responsibilities
//! - Bind every configured endpoint before accepting anything
//! - Release all listeners when any binding fails
//! - Run one accept loop per listener and one task per connection
//! - Stop accept loops on `close()`

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

use crate::http::Dispatcher;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{ConnectTo, Listener, ListenerError};

struct RunningListener {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    listeners: Vec<RunningListener>,
    tracker: ConnectionTracker,
    keep_alive: bool,
    span: Span,
}

impl ConnectionManager {
    pub fn new(keep_alive: bool) -> Self {
        Self {
            listeners: Vec::new(),
            tracker: ConnectionTracker::new(),
            keep_alive,
            span: Span::none(),
        }
    }

    /// Bind all `bindings`, then start accepting.
    ///
    /// On a bind failure the listeners opened so far are dropped and nothing
    /// is left running.
    pub async fn start(
        &mut self,
        bindings: &[ConnectTo],
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Vec<SocketAddr>, ListenerError> {
        self.span = dispatcher.span().clone();
        let mut bound = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match Listener::bind(binding).await {
                Ok(listener) => bound.push(listener),
                Err(e) => {
                    tracing::warn!(parent: &self.span, error = %e, released = bound.len(), "Binding failed");
                    return Err(e);
                }
            }
        }

        let mut addrs = Vec::with_capacity(bound.len());
        for listener in bound {
            let local_addr = listener.local_addr();
            let shutdown = Shutdown::new();
            let task = tokio::spawn(
                accept_loop(
                    listener,
                    Arc::clone(&dispatcher),
                    self.tracker.clone(),
                    self.keep_alive,
                    shutdown.subscribe(),
                )
                .instrument(tracing::info_span!(parent: &self.span, "listener", address = %local_addr)),
            );
            addrs.push(local_addr);
            self.listeners.push(RunningListener {
                local_addr,
                shutdown,
                task,
            });
        }
        Ok(addrs)
    }

    /// Stop every accept loop and release the sockets. In-flight
    /// connections keep running until they finish on their own.
    pub async fn close(&mut self) {
        let listeners = std::mem::take(&mut self.listeners);
        for listener in &listeners {
            listener.shutdown.trigger();
        }
        for listener in listeners {
            // the loop exits on the shutdown signal and drops its socket
            if let Err(e) = listener.task.await {
                if e.is_panic() {
                    tracing::error!(parent: &self.span, address = %listener.local_addr, "Accept loop panicked");
                }
            }
            tracing::info!(parent: &self.span, address = %listener.local_addr, "Listener closed");
        }
    }

    pub fn open_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|l| l.local_addr).collect()
    }

    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        for listener in &self.listeners {
            listener.task.abort();
        }
    }
}

async fn accept_loop(
    listener: Listener,
    dispatcher: Arc<Dispatcher>,
    tracker: ConnectionTracker,
    keep_alive: bool,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer, permit) = match accepted {
            Ok(accepted) => accepted,
            Err(ListenerError::Closed) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Accept failed");
                continue;
            }
        };

        let guard = tracker.track();
        let span = tracing::debug_span!("connection", connection_id = %guard.id(), peer_addr = %peer);
        let dispatcher = Arc::clone(&dispatcher);
        let tls = listener.tls_acceptor();

        tokio::spawn(
            async move {
                let _permit = permit;
                let _guard = guard;
                match tls {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(stream) => serve_connection(stream, peer, dispatcher, keep_alive).await,
                        Err(e) => tracing::debug!(error = %e, "TLS handshake failed"),
                    },
                    None => serve_connection(stream, peer, dispatcher, keep_alive).await,
                }
            }
            .instrument(span),
        );
    }
}

async fn serve_connection<S>(stream: S, peer: SocketAddr, dispatcher: Arc<Dispatcher>, keep_alive: bool)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |request| Arc::clone(&dispatcher).serve(request, peer));
    if let Err(e) = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades()
        .await
    {
        tracing::debug!(error = %e, "Connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::codec::CodecRegistry;
    use crate::http::errors::DefaultErrorWriter;
    use crate::http::interceptor::Interceptors;
    use crate::http::session::MemorySessionManager;
    use crate::routing::RouteTree;

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            RouteTree::new(),
            Interceptors::default(),
            Arc::new(MemorySessionManager::default()),
            Arc::new(DefaultErrorWriter::default()),
            CodecRegistry::default(),
            1024,
            Span::none(),
        ))
    }

    #[tokio::test]
    async fn close_stops_accept_loops_and_frees_ports() {
        let mut manager = ConnectionManager::new(true);
        let addrs = manager
            .start(&[ConnectTo::new("127.0.0.1", 0), ConnectTo::new("127.0.0.1", 0)], dispatcher())
            .await
            .unwrap();
        assert_eq!(manager.open_listeners(), 2);
        assert_eq!(manager.local_addrs(), addrs);

        tokio::time::timeout(std::time::Duration::from_secs(5), manager.close())
            .await
            .expect("accept loops should exit on shutdown");
        assert_eq!(manager.open_listeners(), 0);
        for addr in addrs {
            std::net::TcpListener::bind(addr).unwrap();
        }
    }

    #[tokio::test]
    async fn failed_start_leaves_nothing_running() {
        let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let taken = held.local_addr().unwrap().port();

        let mut manager = ConnectionManager::new(true);
        let err = manager
            .start(&[ConnectTo::new("127.0.0.1", 0), ConnectTo::new("127.0.0.1", taken)], dispatcher())
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Bind { .. }));
        assert_eq!(manager.open_listeners(), 0);
        manager.close().await;
    }
}
