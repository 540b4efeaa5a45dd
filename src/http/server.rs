//! Server composition root.
//!
//! # Responsibilities
//! - Collect routes, groups and default interceptors before serving
//! - Hold the session manager, error writer and codec registry
//! - Freeze everything into a `Dispatcher` on first `serve()`
//! - Start, restart and close the listener set
//!
//! # Design Decisions
//! - Registration after the first `serve()` fails with `AlreadyStarted`
//! - Groups copy the current defaults when created; later edits do not reach them
//! - `restart()` reuses the frozen dispatcher and re-binds every endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use axum::http::Method;
use futures_util::future::BoxFuture;
use tracing::Span;

use crate::config::ServerConfig;
use crate::http::codec::{Codec, CodecRegistry};
use crate::http::errors::{DefaultErrorWriter, ErrorWriter};
use crate::http::interceptor::{ExceptionHandler, HandlerResult, Interceptor, Interceptors};
use crate::http::pipeline::Dispatcher;
use crate::http::session::{MemorySessionManager, SessionManager};
use crate::http::Context;
use crate::net::{ConnectTo, ConnectionManager, ListenerError};
use crate::routing::{Endpoint, Group, Route, RouteError, RouteTree};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("server already started; registration is closed")]
    AlreadyStarted,
    #[error("server was never started")]
    NotStarted,
    #[error("no listeners configured")]
    NoBindings,
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

pub struct Server {
    config: ServerConfig,
    routes: RouteTree<Arc<Endpoint>>,
    defaults: Interceptors,
    bindings: Vec<ConnectTo>,
    sessions: Arc<dyn SessionManager>,
    errors: Arc<dyn ErrorWriter>,
    codecs: CodecRegistry,
    dispatcher: ArcSwapOption<Dispatcher>,
    connections: ConnectionManager,
    span: Span,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let span = tracing::info_span!("server", server = %config.name);
        Self {
            routes: RouteTree::new(),
            defaults: Interceptors::default(),
            bindings: Vec::new(),
            sessions: Arc::new(MemorySessionManager::new(config.session.cookie_name.clone())),
            errors: Arc::new(DefaultErrorWriter::new(config.http.expose_fault_details)),
            codecs: CodecRegistry::default(),
            dispatcher: ArcSwapOption::empty(),
            connections: ConnectionManager::new(config.http.keep_alive),
            span,
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), ServerError> {
        if self.dispatcher.load().is_some() {
            Err(ServerError::AlreadyStarted)
        } else {
            Ok(())
        }
    }

    pub fn route(&mut self, route: Route) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        let (pattern, methods, endpoint) = route.into_parts();
        self.routes.insert(&pattern, &methods, endpoint)?;
        tracing::debug!(parent: &self.span, pattern = %pattern, methods = ?methods, "Route registered");
        Ok(self)
    }

    fn add<F>(&mut self, methods: &[Method], pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::new(methods.iter().cloned(), pattern, handler))
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(&[Method::GET], pattern, handler)
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(&[Method::POST], pattern, handler)
    }

    pub fn put<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(&[Method::PUT], pattern, handler)
    }

    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(&[Method::PATCH], pattern, handler)
    }

    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.add(&[Method::DELETE], pattern, handler)
    }

    pub fn any<F>(&mut self, pattern: &str, handler: F) -> Result<&mut Self, ServerError>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::any(pattern, handler))
    }

    /// Default before-interceptor for routes registered outside any group.
    pub fn before(&mut self, interceptor: impl Interceptor) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.defaults.push_before(Arc::new(interceptor));
        Ok(self)
    }

    pub fn after(&mut self, interceptor: impl Interceptor) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.defaults.push_after(Arc::new(interceptor));
        Ok(self)
    }

    pub fn on_exception(&mut self, handler: impl ExceptionHandler) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.defaults.push_on_exception(Arc::new(handler));
        Ok(self)
    }

    /// A group starting from a copy of the current default lists.
    pub fn group(&self, prefix: &str) -> Group {
        Group::new(prefix, self.defaults.clone())
    }

    pub fn mount(&mut self, group: Group) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        for route in group.into_routes() {
            self.route(route)?;
        }
        Ok(self)
    }

    pub fn with_session_manager(&mut self, sessions: impl SessionManager) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.sessions = Arc::new(sessions);
        Ok(self)
    }

    pub fn with_error_writer(&mut self, errors: impl ErrorWriter) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.errors = Arc::new(errors);
        Ok(self)
    }

    pub fn register_codec(&mut self, codec: impl Codec) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.codecs.register(codec);
        Ok(self)
    }

    /// Listen on `binding` in addition to the configured listeners.
    pub fn also_to(&mut self, binding: ConnectTo) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.bindings.push(binding);
        Ok(self)
    }

    /// Parent span for everything this server logs.
    pub fn log_to(&mut self, span: Span) -> Result<&mut Self, ServerError> {
        self.ensure_open()?;
        self.span = span;
        Ok(self)
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Freeze the registrations on first use and start every listener.
    pub async fn serve(&mut self) -> Result<Vec<SocketAddr>, ServerError> {
        if self.connections.open_listeners() > 0 {
            return Err(ServerError::AlreadyStarted);
        }
        let bindings = self.resolve_bindings().await?;
        let dispatcher = match self.dispatcher.load_full() {
            Some(dispatcher) => dispatcher,
            None => {
                let dispatcher = Arc::new(self.freeze());
                self.dispatcher.store(Some(Arc::clone(&dispatcher)));
                dispatcher
            }
        };

        let addrs = self.connections.start(&bindings, dispatcher).await?;
        tracing::info!(parent: &self.span, listeners = addrs.len(), addresses = ?addrs, "Server started");
        Ok(addrs)
    }

    /// Close every listener and bind again with the same routes.
    pub async fn restart(&mut self) -> Result<Vec<SocketAddr>, ServerError> {
        if self.dispatcher.load().is_none() {
            return Err(ServerError::NotStarted);
        }
        self.close().await;
        self.serve().await
    }

    /// Stop accepting. A no-op when nothing is listening.
    pub async fn close(&mut self) {
        if self.connections.open_listeners() == 0 {
            return;
        }
        self.connections.close().await;
        tracing::info!(parent: &self.span, "Server closed");
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.connections.local_addrs()
    }

    pub fn is_serving(&self) -> bool {
        self.connections.open_listeners() > 0
    }

    pub fn open_listeners(&self) -> usize {
        self.connections.open_listeners()
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.active_connections()
    }

    /// The frozen request pipeline, once the server has started.
    pub fn dispatcher(&self) -> Option<Arc<Dispatcher>> {
        self.dispatcher.load_full()
    }

    async fn resolve_bindings(&self) -> Result<Vec<ConnectTo>, ServerError> {
        let mut bindings = Vec::with_capacity(self.config.listeners.len() + self.bindings.len());
        for listener in &self.config.listeners {
            bindings.push(ConnectTo::from_config(listener).await?);
        }
        bindings.extend(self.bindings.iter().cloned());
        if bindings.is_empty() {
            return Err(ServerError::NoBindings);
        }
        Ok(bindings)
    }

    fn freeze(&mut self) -> Dispatcher {
        Dispatcher::new(
            std::mem::take(&mut self.routes),
            std::mem::take(&mut self.defaults),
            Arc::clone(&self.sessions),
            Arc::clone(&self.errors),
            std::mem::take(&mut self.codecs),
            self.config.http.max_body_bytes,
            self.span.clone(),
        )
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.name)
            .field("routes", &self.routes.len())
            .field("defaults", &self.defaults)
            .field("bindings", &self.bindings)
            .field("started", &self.dispatcher.load().is_some())
            .field("listeners", &self.connections.open_listeners())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{interceptor_fn, Outcome, Reply};
    use axum::http::StatusCode;

    fn ok(_ctx: &mut Context) -> BoxFuture<'_, HandlerResult> {
        Box::pin(async { Ok(Reply::empty(StatusCode::OK)) })
    }

    #[tokio::test]
    async fn serve_without_bindings_fails() {
        let mut server = Server::new(ServerConfig::default());
        assert!(matches!(server.serve().await, Err(ServerError::NoBindings)));
        // nothing was frozen, registration stays open
        assert!(server.get("/", ok).is_ok());
    }

    #[tokio::test]
    async fn restart_requires_start() {
        let mut server = Server::new(ServerConfig::default());
        assert!(matches!(server.restart().await, Err(ServerError::NotStarted)));
    }

    #[test]
    fn duplicate_route_is_rejected() {
        let mut server = Server::new(ServerConfig::default());
        server.get("/a", ok).unwrap();
        assert!(matches!(server.get("/a", ok), Err(ServerError::Route(RouteError::Duplicate { .. }))));
    }

    #[test]
    fn group_snapshots_current_defaults() {
        let mut server = Server::new(ServerConfig::default());
        server.before(interceptor_fn("a", |_ctx| Box::pin(async { Outcome::Continue }))).unwrap();
        let group = server.group("/g");
        server.before(interceptor_fn("b", |_ctx| Box::pin(async { Outcome::Continue }))).unwrap();
        assert_eq!(group.interceptors().before.len(), 1);
    }

    #[tokio::test]
    async fn registration_closes_after_serve() {
        let mut server = Server::new(ServerConfig::default());
        server.get("/", ok).unwrap();
        server.also_to(ConnectTo::new("127.0.0.1", 0)).unwrap();
        let addrs = server.serve().await.unwrap();
        assert_eq!(addrs.len(), 1);
        assert_eq!(server.dispatcher().unwrap().routes(), 1);

        assert!(matches!(server.get("/late", ok), Err(ServerError::AlreadyStarted)));
        assert!(matches!(
            server.also_to(ConnectTo::new("127.0.0.1", 0)),
            Err(ServerError::AlreadyStarted)
        ));
        assert!(matches!(server.serve().await, Err(ServerError::AlreadyStarted)));
        server.close().await;
        assert!(!server.is_serving());
    }
}
