//! Handler faults.
//!
//! A `Fault` is what interceptors, handlers and exception handlers fail with.
//! The pipeline turns it into a response in this order:
//! 1. a fault wrapping a response (`Fault::reply`) yields that response verbatim
//! 2. a fault with a status (`Fault::status`, `HttpError`) renders its own response
//! 3. anything else goes to the error writer's 500 path, together with `trace()`
//!
//! Any `std::error::Error` converts into a `Fault`, so handlers can use `?`.

use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

use axum::http::StatusCode;

use crate::http::reply::{self, Response};

/// Boxed error accepted by [`Fault::new`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An error with an HTTP status and a client-facing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Response rendered for this error.
    pub fn response(&self) -> Response {
        reply::text(self.status, self.message.clone())
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

#[derive(Debug)]
enum FaultKind {
    Reply(Response),
    Http(HttpError),
    Error(BoxError),
    Panic(String),
}

/// Failure raised while handling a request.
#[derive(Debug)]
pub struct Fault {
    kind: FaultKind,
    trace: Backtrace,
}

impl Fault {
    fn with_kind(kind: FaultKind) -> Self {
        Self {
            kind,
            trace: Backtrace::capture(),
        }
    }

    /// A fault that carries a finished response, e.g. a 401 or 429.
    pub fn reply(response: Response) -> Self {
        Self::with_kind(FaultKind::Reply(response))
    }

    /// A fault rendered as `status` with a text body.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::with_kind(FaultKind::Http(HttpError::new(status, message)))
    }

    /// Wrap an arbitrary error; rendered by the error writer.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self::with_kind(FaultKind::Error(error.into()))
    }

    /// A fault with only a message; rendered by the error writer.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(message.to_string())
    }

    pub(crate) fn panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::with_kind(FaultKind::Panic(message))
    }

    /// Response this fault carries or renders by itself, if any.
    pub fn response(&self) -> Option<Response> {
        match &self.kind {
            FaultKind::Reply(response) => Some(reply::clone_response(response)),
            FaultKind::Http(error) => Some(error.response()),
            FaultKind::Error(_) | FaultKind::Panic(_) => None,
        }
    }

    /// Backtrace captured when the fault was created.
    ///
    /// Empty unless `RUST_BACKTRACE` or `RUST_LIB_BACKTRACE` is set.
    pub fn trace(&self) -> &Backtrace {
        &self.trace
    }

    /// The wrapped error, for faults built from one.
    pub fn source_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match &self.kind {
            FaultKind::Error(error) => Some(error.as_ref()),
            _ => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self.kind, FaultKind::Panic(_))
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self.kind {
            FaultKind::Reply(_) => "reply",
            FaultKind::Http(_) => "http",
            FaultKind::Error(_) => "error",
            FaultKind::Panic(_) => "panic",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            FaultKind::Reply(response) => write!(f, "request answered early with {}", response.status()),
            FaultKind::Http(error) => write!(f, "{error}"),
            FaultKind::Error(error) => write!(f, "{error}"),
            FaultKind::Panic(message) => write!(f, "handler panicked: {message}"),
        }
    }
}

impl<E> From<E> for Fault
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl From<HttpError> for Fault {
    fn from(error: HttpError) -> Self {
        Self::with_kind(FaultKind::Http(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_fault_returns_its_response() {
        let fault = Fault::reply(reply::text(StatusCode::TOO_MANY_REQUESTS, "Limit exceeded"));
        let response = fault.response().unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.body().as_ref(), b"Limit exceeded");
        // still available for exception handlers afterwards
        assert!(fault.response().is_some());
        assert_eq!(fault.kind(), "reply");
    }

    #[test]
    fn status_fault_renders_message() {
        let fault = Fault::status(StatusCode::BAD_REQUEST, "missing field");
        let response = fault.response().unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(fault.to_string(), "400 Bad Request: missing field");
    }

    #[test]
    fn plain_errors_have_no_response() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let fault: Fault = io.into();
        assert!(fault.response().is_none());
        assert_eq!(fault.kind(), "error");
        assert!(fault.source_error().is_some());
        assert_eq!(fault.to_string(), "disk gone");
    }

    #[test]
    fn panic_payloads_are_described() {
        let fault = Fault::panic(Box::new("boom"));
        assert!(fault.is_panic());
        assert_eq!(fault.to_string(), "handler panicked: boom");

        let fault = Fault::panic(Box::new(String::from("bang")));
        assert_eq!(fault.to_string(), "handler panicked: bang");
    }
}
