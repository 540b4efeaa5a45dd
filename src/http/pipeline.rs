//! Request pipeline.
//!
//! # Data Flow
//! ```text
//! Request<Incoming>
//!     → buffer body (413 past the limit, 400 on a broken body)
//!     → route tree lookup → Context (own copy of the interceptor lists)
//!     → before-interceptors, in order        ─┐ short-circuit stops here
//!     → handler | not_found | method_not_allowed
//!     → on fault: convert to response, then on-exception handlers in reverse
//!     → after-interceptors (every path, once)
//!     → session write if dirty (skipped for upgrades)
//!     → Response, x-request-id stamped
//! ```
//!
//! # Design Decisions
//! - Panics in user code are caught and treated as faults
//! - Exception handlers observe the fault but never replace the response
//! - Failures while building an error response fall back to a bare 500

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use futures_util::FutureExt;
use http_body_util::LengthLimitError;
use hyper::body::Incoming;
use tracing::{Instrument, Span};

use crate::http::codec::CodecRegistry;
use crate::http::errors::ErrorWriter;
use crate::http::interceptor::{HandlerResult, Interceptors, Outcome};
use crate::http::reply::{self, Reply, Response};
use crate::http::session::SessionManager;
use crate::http::{Context, Fault};
use crate::observability::metrics;
use crate::routing::{Endpoint, Lookup, RouteTree};

enum Target {
    Endpoint(Arc<Endpoint>),
    NotFound,
    MethodNotAllowed(Vec<Method>),
    /// The body could not be buffered; answered before any interceptor runs.
    Rejected(Fault),
}

/// Frozen request-handling state shared by every connection.
pub struct Dispatcher {
    tree: RouteTree<Arc<Endpoint>>,
    defaults: Arc<Interceptors>,
    sessions: Arc<dyn SessionManager>,
    errors: Arc<dyn ErrorWriter>,
    codecs: Arc<CodecRegistry>,
    max_body_bytes: usize,
    span: Span,
}

impl Dispatcher {
    pub(crate) fn new(
        tree: RouteTree<Arc<Endpoint>>,
        defaults: Interceptors,
        sessions: Arc<dyn SessionManager>,
        errors: Arc<dyn ErrorWriter>,
        codecs: CodecRegistry,
        max_body_bytes: usize,
        span: Span,
    ) -> Self {
        Self {
            tree,
            defaults: Arc::new(defaults),
            sessions,
            errors,
            codecs: Arc::new(codecs),
            max_body_bytes,
            span,
        }
    }

    /// Number of registered (path, method) pairs.
    pub fn routes(&self) -> usize {
        self.tree.len()
    }

    /// The owning server's log span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Entry point for connections: buffer the body, dispatch, convert the body type.
    pub(crate) async fn serve(
        self: Arc<Self>,
        request: Request<Incoming>,
        peer: SocketAddr,
    ) -> Result<axum::http::Response<Body>, Infallible> {
        let (parts, body) = request.into_parts();
        let response = match axum::body::to_bytes(Body::new(body), self.max_body_bytes).await {
            Ok(bytes) => self.dispatch(Request::from_parts(parts, bytes), Some(peer)).await,
            Err(e) => {
                tracing::debug!(parent: &self.span, peer = %peer, error = %e, "Request body rejected");
                let request = Request::from_parts(parts, Bytes::new());
                self.dispatch_inner(request, Some(peer), Some(body_rejection(&e))).await
            }
        };
        Ok(reply::into_body(response))
    }

    /// Run one buffered request through the pipeline.
    pub async fn dispatch(&self, request: Request<Bytes>, peer: Option<SocketAddr>) -> Response {
        self.dispatch_inner(request, peer, None).await
    }

    async fn dispatch_inner(
        &self,
        request: Request<Bytes>,
        peer: Option<SocketAddr>,
        rejected: Option<Fault>,
    ) -> Response {
        let started = Instant::now();
        let method = request.method().clone();

        let (target, params, lists, pattern) = match self.tree.lookup(request.uri().path(), request.method()) {
            Lookup::Found { value, params } => {
                let lists = value.interceptors(&self.defaults);
                let pattern = value.pattern().to_string();
                (Target::Endpoint(Arc::clone(value)), params, lists, Some(pattern))
            }
            Lookup::MethodNotAllowed { allowed } => (
                Target::MethodNotAllowed(allowed),
                Default::default(),
                (*self.defaults).clone(),
                None,
            ),
            Lookup::NotFound => (Target::NotFound, Default::default(), (*self.defaults).clone(), None),
        };
        let target = match rejected {
            Some(fault) => Target::Rejected(fault),
            None => target,
        };

        let mut ctx = Context::with_services(
            request,
            Arc::clone(&self.sessions),
            Arc::clone(&self.codecs),
            &self.span,
        );
        ctx.set_peer(peer);
        ctx.set_params(params);
        if let Some(pattern) = pattern {
            ctx.set_route_pattern(pattern);
        }
        ctx.install(&lists);

        let span = ctx.span().clone();
        let response = self.run(&mut ctx, target).instrument(span).await;

        metrics::record_request(method.as_str(), response.status().as_u16(), started);
        response
    }

    async fn run(&self, ctx: &mut Context, target: Target) -> Response {
        let result = match AssertUnwindSafe(self.run_stages(ctx, target)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Fault::panic(payload)),
        };

        let (handled, fault) = match result {
            Ok(handled) => (handled, None),
            Err(fault) => {
                let response = self.convert(ctx, &fault);
                (Reply::Response(response), Some(fault))
            }
        };

        if let Some(fault) = &fault {
            metrics::record_fault(fault.kind());
            self.notify_exception_handlers(ctx, fault).await;
        }

        let skip = matches!(handled, Reply::Skip);
        let response = match handled {
            Reply::Response(response) => response,
            Reply::Skip => ctx
                .take_response()
                .unwrap_or_else(|| reply::empty(StatusCode::SWITCHING_PROTOCOLS)),
        };
        ctx.set_response(response);

        self.run_after(ctx).await;

        if !skip && ctx.session_needs_update() {
            self.write_session(ctx).await;
        }

        let mut response = ctx.take_response().unwrap_or_else(reply::internal_error);
        if skip {
            *response.body_mut() = Bytes::new();
        }
        ctx.id().stamp(&mut response);
        response
    }

    async fn run_stages(&self, ctx: &mut Context, target: Target) -> HandlerResult {
        let target = match target {
            Target::Rejected(fault) => return Err(fault),
            target => target,
        };

        let mut index = 0;
        while let Some(interceptor) = ctx.before.get(index).cloned() {
            index += 1;
            match interceptor.intercept(ctx).await {
                Outcome::Continue => {}
                Outcome::ShortCircuit(response) => {
                    tracing::debug!(
                        interceptor = interceptor.name(),
                        status = %response.status(),
                        "Request short-circuited"
                    );
                    return Ok(Reply::Response(response));
                }
                Outcome::Fault(fault) => return Err(fault),
            }
        }

        match target {
            Target::Endpoint(endpoint) => endpoint.handler.call(ctx).await,
            Target::NotFound => {
                tracing::debug!("No route matched");
                Ok(self.errors.not_found(ctx).into())
            }
            Target::MethodNotAllowed(allowed) => {
                tracing::debug!(allowed = ?allowed, "Method not allowed");
                Ok(self.errors.method_not_allowed(ctx, &allowed).into())
            }
            Target::Rejected(fault) => Err(fault),
        }
    }

    /// Turn a fault into the response the client sees.
    fn convert(&self, ctx: &Context, fault: &Fault) -> Response {
        if let Some(response) = fault.response() {
            tracing::debug!(fault = %fault, status = %response.status(), "Fault answered with its own response");
            return response;
        }

        tracing::error!(fault = %fault, kind = fault.kind(), "Request failed");
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.errors.internal(ctx, fault))) {
            Ok(response) => response,
            Err(_) => {
                tracing::error!("Error writer panicked, sending bare 500");
                reply::internal_error()
            }
        }
    }

    async fn notify_exception_handlers(&self, ctx: &mut Context, fault: &Fault) {
        let handlers = ctx.on_exception.clone();
        for handler in handlers.iter().rev() {
            match AssertUnwindSafe(handler.handle(ctx, fault)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => tracing::warn!(error = %error, "Exception handler failed"),
                Err(_) => tracing::warn!("Exception handler panicked"),
            }
        }
    }

    async fn run_after(&self, ctx: &mut Context) {
        let mut index = 0;
        while let Some(interceptor) = ctx.after.get(index).cloned() {
            index += 1;
            let outcome = match AssertUnwindSafe(interceptor.intercept(ctx)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(payload) => Outcome::Fault(Fault::panic(payload)),
            };
            match outcome {
                Outcome::Continue => {}
                Outcome::ShortCircuit(response) => {
                    ctx.set_response(response);
                    break;
                }
                Outcome::Fault(fault) => {
                    tracing::warn!(interceptor = interceptor.name(), fault = %fault, "After-interceptor failed");
                    metrics::record_fault(fault.kind());
                    let response = self.convert(ctx, &fault);
                    ctx.set_response(response);
                    break;
                }
            }
        }
    }

    async fn write_session(&self, ctx: &mut Context) {
        let sessions = ctx.session_manager();
        let fault = match AssertUnwindSafe(sessions.write(ctx)).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(fault)) => fault,
            Err(payload) => Fault::panic(payload),
        };
        tracing::error!(fault = %fault, "Session write failed");
        metrics::record_fault(fault.kind());
        let response = self.convert(ctx, &fault);
        ctx.set_response(response);
    }
}

/// 413 when the body outgrew the limit, 400 for any other read failure.
fn body_rejection(error: &axum::Error) -> Fault {
    let too_large = std::iter::successors(Some(error as &(dyn std::error::Error + 'static)), |e| e.source())
        .any(|e| e.is::<LengthLimitError>());
    if too_large {
        Fault::reply(reply::text(StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large"))
    } else {
        Fault::reply(reply::text(StatusCode::BAD_REQUEST, "Bad Request"))
    }
}
