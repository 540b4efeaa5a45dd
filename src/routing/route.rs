//! Route definitions.
//!
//! A `Route` couples a pattern, its methods and a handler with the route's own
//! interceptors. Routes created through a `Group` also carry the group's
//! interceptor snapshot, used instead of the server defaults.

use std::sync::Arc;

use axum::http::Method;
use futures_util::future::BoxFuture;

use crate::http::interceptor::{ExceptionHandler, FnHandler, Handler, HandlerResult, Interceptor, Interceptors};
use crate::http::Context;

/// What the route tree stores for a registered route.
pub struct Endpoint {
    pub(crate) pattern: String,
    pub(crate) handler: Arc<dyn Handler>,
    /// Group snapshot; `None` means the server defaults apply.
    pub(crate) scope: Option<Arc<Interceptors>>,
    pub(crate) own: Interceptors,
}

impl Endpoint {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Full interceptor lists for a request: base set, then the route's own.
    pub(crate) fn interceptors(&self, defaults: &Interceptors) -> Interceptors {
        self.scope.as_deref().unwrap_or(defaults).chain(&self.own)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("pattern", &self.pattern)
            .field("scoped", &self.scope.is_some())
            .field("own", &self.own)
            .finish()
    }
}

/// A route waiting to be registered.
pub struct Route {
    pattern: String,
    methods: Vec<Method>,
    handler: Arc<dyn Handler>,
    own: Interceptors,
    scope: Option<Arc<Interceptors>>,
}

impl Route {
    pub fn new<F>(methods: impl IntoIterator<Item = Method>, pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::from_handler(methods, pattern, Arc::new(FnHandler(handler)))
    }

    pub fn from_handler(
        methods: impl IntoIterator<Item = Method>,
        pattern: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            methods: methods.into_iter().collect(),
            handler,
            own: Interceptors::default(),
            scope: None,
        }
    }

    pub fn get<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new([Method::GET], pattern, handler)
    }

    pub fn post<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new([Method::POST], pattern, handler)
    }

    pub fn put<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new([Method::PUT], pattern, handler)
    }

    pub fn patch<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new([Method::PATCH], pattern, handler)
    }

    pub fn delete<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new([Method::DELETE], pattern, handler)
    }

    /// Every standard method except CONNECT and TRACE.
    pub fn any<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        Self::new(
            [
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ],
            pattern,
            handler,
        )
    }

    pub fn before(mut self, interceptor: impl Interceptor) -> Self {
        self.own.push_before(Arc::new(interceptor));
        self
    }

    pub fn after(mut self, interceptor: impl Interceptor) -> Self {
        self.own.push_after(Arc::new(interceptor));
        self
    }

    pub fn on_exception(mut self, handler: impl ExceptionHandler) -> Self {
        self.own.push_on_exception(Arc::new(handler));
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub(crate) fn with_prefix(mut self, prefix: &str) -> Self {
        self.pattern = join_paths(prefix, &self.pattern);
        self
    }

    /// Attach `scope` unless the route already belongs to an inner group.
    pub(crate) fn scoped(mut self, scope: &Arc<Interceptors>) -> Self {
        if self.scope.is_none() {
            self.scope = Some(Arc::clone(scope));
        }
        self
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Method>, Arc<Endpoint>) {
        let endpoint = Arc::new(Endpoint {
            pattern: self.pattern.clone(),
            handler: self.handler,
            scope: self.scope,
            own: self.own,
        });
        (self.pattern, self.methods, endpoint)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

pub(crate) fn join_paths(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => format!("/{path}"),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix}/{path}"),
    }
}
