//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use switchyard::http::{BoxFuture, Context, Fault, MemorySessionManager, Session, SessionManager};
use switchyard::{ConnectTo, Server, ServerConfig};

/// A server with no configured listeners; tests add their own bindings.
pub fn server() -> Server {
    Server::new(ServerConfig::default())
}

/// Bind `server` to an ephemeral localhost port and return its base URL.
pub async fn serve(server: &mut Server) -> String {
    server.also_to(ConnectTo::new("127.0.0.1", 0)).unwrap();
    let addrs = server.serve().await.unwrap();
    base_url(addrs[0])
}

pub fn base_url(addr: SocketAddr) -> String {
    format!("http://{addr}")
}

/// Non-pooled client so every request opens a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().pool_max_idle_per_host(0).build().unwrap()
}

/// In-memory session manager that counts reads and writes.
#[derive(Debug, Default)]
pub struct CountingSessions {
    inner: MemorySessionManager,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl CountingSessions {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SessionManager for CountingSessions {
    fn read<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<Session, Fault>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(ctx)
    }

    fn write<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Fault>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(ctx)
    }
}
