//! Route groups.
//!
//! A group is a registration scope with a path prefix. It starts from a copy
//! of its parent's interceptor lists taken when the group is created; changes
//! made to the parent afterwards do not reach it. The group's lists are
//! attached to its routes when the group is mounted.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::interceptor::{ExceptionHandler, HandlerResult, Interceptor, Interceptors};
use crate::http::Context;
use crate::routing::route::{join_paths, Route};

pub struct Group {
    prefix: String,
    interceptors: Interceptors,
    routes: Vec<Route>,
}

impl Group {
    pub(crate) fn new(prefix: &str, inherited: Interceptors) -> Self {
        Self {
            prefix: join_paths(prefix, ""),
            interceptors: inherited,
            routes: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn interceptors(&self) -> &Interceptors {
        &self.interceptors
    }

    pub fn before(&mut self, interceptor: impl Interceptor) -> &mut Self {
        self.interceptors.push_before(Arc::new(interceptor));
        self
    }

    pub fn after(&mut self, interceptor: impl Interceptor) -> &mut Self {
        self.interceptors.push_after(Arc::new(interceptor));
        self
    }

    pub fn on_exception(&mut self, handler: impl ExceptionHandler) -> &mut Self {
        self.interceptors.push_on_exception(Arc::new(handler));
        self
    }

    /// Add a route; its pattern is relative to the group prefix.
    pub fn route(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::get(pattern, handler))
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::post(pattern, handler))
    }

    pub fn put<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::put(pattern, handler))
    }

    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::patch(pattern, handler))
    }

    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::delete(pattern, handler))
    }

    pub fn any<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.route(Route::any(pattern, handler))
    }

    /// Nested group inheriting this group's current lists.
    pub fn group(&self, prefix: &str) -> Group {
        Group::new(prefix, self.interceptors.clone())
    }

    /// Add a nested group's routes to this group.
    pub fn mount(&mut self, group: Group) -> &mut Self {
        self.routes.extend(group.into_routes());
        self
    }

    /// Routes with the prefix applied and the group snapshot attached.
    pub(crate) fn into_routes(self) -> Vec<Route> {
        let scope = Arc::new(self.interceptors);
        let prefix = self.prefix;
        self.routes
            .into_iter()
            .map(|route| route.with_prefix(&prefix).scoped(&scope))
            .collect()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("prefix", &self.prefix)
            .field("interceptors", &self.interceptors)
            .field("routes", &self.routes)
            .finish()
    }
}
