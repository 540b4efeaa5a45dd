//! Handler and interceptor traits.
//!
//! Handlers, interceptors and exception handlers all borrow the request
//! [`Context`] mutably for the duration of a boxed future. Closures are adapted
//! through [`interceptor_fn`] and [`exception_fn`]; the closure form is
//! `|ctx| Box::pin(async move { ... })`.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::http::reply::{Reply, Response};
use crate::http::{Context, Fault};

/// Result of a handler.
pub type HandlerResult = Result<Reply, Fault>;

/// Result of an interceptor.
#[derive(Debug)]
pub enum Outcome {
    /// Keep going.
    Continue,
    /// Answer the request with this response and skip the remaining stages.
    ShortCircuit(Response),
    /// Fail the request.
    Fault(Fault),
}

impl From<Fault> for Outcome {
    fn from(fault: Fault) -> Self {
        Outcome::Fault(fault)
    }
}

impl From<Result<(), Fault>> for Outcome {
    fn from(result: Result<(), Fault>) -> Self {
        match result {
            Ok(()) => Outcome::Continue,
            Err(fault) => Outcome::Fault(fault),
        }
    }
}

/// Produces the response for a matched route.
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult>;
}

/// Runs before or after a handler.
pub trait Interceptor: Send + Sync + 'static {
    fn intercept<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Observes faults after they have been turned into a response.
pub trait ExceptionHandler: Send + Sync + 'static {
    fn handle<'a>(&'a self, ctx: &'a mut Context, fault: &'a Fault) -> BoxFuture<'a, Result<(), Fault>>;
}

impl<T: Interceptor + ?Sized> Interceptor for Arc<T> {
    fn intercept<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        (**self).intercept(ctx)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<T: ExceptionHandler + ?Sized> ExceptionHandler for Arc<T> {
    fn handle<'a>(&'a self, ctx: &'a mut Context, fault: &'a Fault) -> BoxFuture<'a, Result<(), Fault>> {
        (**self).handle(ctx, fault)
    }
}

pub(crate) struct FnHandler<F>(pub(crate) F);

impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        (self.0)(ctx)
    }
}

/// Interceptor built from a closure.
pub struct FnInterceptor<F> {
    name: &'static str,
    f: F,
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    fn intercept<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        (self.f)(ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Wrap a closure as an [`Interceptor`].
pub fn interceptor_fn<F>(name: &'static str, f: F) -> FnInterceptor<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Outcome> + Send + Sync + 'static,
{
    FnInterceptor { name, f }
}

/// Exception handler built from a closure.
pub struct FnExceptionHandler<F>(F);

impl<F> ExceptionHandler for FnExceptionHandler<F>
where
    F: for<'a> Fn(&'a mut Context, &'a Fault) -> BoxFuture<'a, Result<(), Fault>> + Send + Sync + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a mut Context, fault: &'a Fault) -> BoxFuture<'a, Result<(), Fault>> {
        (self.0)(ctx, fault)
    }
}

/// Wrap a closure as an [`ExceptionHandler`].
pub fn exception_fn<F>(f: F) -> FnExceptionHandler<F>
where
    F: for<'a> Fn(&'a mut Context, &'a Fault) -> BoxFuture<'a, Result<(), Fault>> + Send + Sync + 'static,
{
    FnExceptionHandler(f)
}

/// Ordered before, after and on-exception lists.
///
/// Cloning copies the lists (the entries are shared `Arc`s), so a clone never
/// observes later pushes to the original.
#[derive(Clone, Default)]
pub struct Interceptors {
    pub(crate) before: Vec<Arc<dyn Interceptor>>,
    pub(crate) after: Vec<Arc<dyn Interceptor>>,
    pub(crate) on_exception: Vec<Arc<dyn ExceptionHandler>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_before(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.before.push(interceptor);
    }

    pub fn push_after(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.after.push(interceptor);
    }

    pub fn push_on_exception(&mut self, handler: Arc<dyn ExceptionHandler>) {
        self.on_exception.push(handler);
    }

    /// `self` followed by `other`, list by list.
    pub fn chain(&self, other: &Interceptors) -> Interceptors {
        let mut merged = self.clone();
        merged.before.extend(other.before.iter().cloned());
        merged.after.extend(other.after.iter().cloned());
        merged.on_exception.extend(other.on_exception.iter().cloned());
        merged
    }

    pub fn len(&self) -> usize {
        self.before.len() + self.after.len() + self.on_exception.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Interceptors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptors")
            .field("before", &self.before.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("after", &self.after.iter().map(|i| i.name()).collect::<Vec<_>>())
            .field("on_exception", &self.on_exception.len())
            .finish()
    }
}
