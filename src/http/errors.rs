//! Error responses.
//!
//! The error writer renders the responses the framework produces on its own:
//! unknown paths, unsupported methods and faults without a response of their
//! own. Fault details stay server-side unless explicitly exposed.

use axum::http::{header, HeaderValue, Method, StatusCode};

use crate::http::reply::{self, Response};
use crate::http::{Context, Fault};

/// Renders framework-generated error responses.
pub trait ErrorWriter: Send + Sync + 'static {
    /// No route matched the path.
    fn not_found(&self, ctx: &Context) -> Response;

    /// The path exists but not for this method.
    fn method_not_allowed(&self, _ctx: &Context, allowed: &[Method]) -> Response {
        let mut response = reply::text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
        if let Ok(value) = HeaderValue::from_str(&allow) {
            response.headers_mut().insert(header::ALLOW, value);
        }
        response
    }

    /// A fault that carries no response of its own.
    fn internal(&self, ctx: &Context, fault: &Fault) -> Response;
}

/// Plain-text error pages.
#[derive(Debug, Clone, Default)]
pub struct DefaultErrorWriter {
    expose_details: bool,
}

impl DefaultErrorWriter {
    pub fn new(expose_details: bool) -> Self {
        Self { expose_details }
    }
}

impl ErrorWriter for DefaultErrorWriter {
    fn not_found(&self, _ctx: &Context) -> Response {
        reply::text(StatusCode::NOT_FOUND, "Not Found")
    }

    fn internal(&self, ctx: &Context, fault: &Fault) -> Response {
        if self.expose_details {
            reply::text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal Server Error ({}): {fault}", ctx.id()),
            )
        } else {
            reply::internal_error()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use bytes::Bytes;

    fn ctx() -> Context {
        Context::new(Request::builder().uri("/x").body(Bytes::new()).unwrap())
    }

    #[test]
    fn hides_fault_details_by_default() {
        let writer = DefaultErrorWriter::default();
        let response = writer.internal(&ctx(), &Fault::msg("db password is hunter2"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().as_ref(), b"Internal Server Error");
    }

    #[test]
    fn exposes_details_when_asked() {
        let writer = DefaultErrorWriter::new(true);
        let response = writer.internal(&ctx(), &Fault::msg("boom"));
        assert!(String::from_utf8_lossy(response.body()).ends_with("boom"));
    }

    #[test]
    fn method_not_allowed_lists_methods() {
        let writer = DefaultErrorWriter::default();
        let response = writer.method_not_allowed(&ctx(), &[Method::GET, Method::POST]);
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[header::ALLOW], "GET, POST");
    }
}
