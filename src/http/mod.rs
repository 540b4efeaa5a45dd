//! HTTP request handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net)
//!     → pipeline.rs (buffer body, route lookup, build Context)
//!     → interceptor.rs (before → handler → on-exception → after)
//!     → session.rs (write back when dirty)
//!     → errors.rs (404/405/500 pages)
//!     → reply.rs (response helpers), request.rs (x-request-id)
//!     → Send to client
//! ```
//!
//! `server.rs` is where applications register routes and start listening.

pub mod codec;
pub mod context;
pub mod errors;
pub mod fault;
pub mod interceptor;
pub mod pipeline;
pub mod reply;
pub mod request;
pub mod server;
pub mod session;
pub mod websocket;

pub use codec::{Codec, CodecError, CodecRegistry};
pub use context::Context;
pub use errors::{DefaultErrorWriter, ErrorWriter};
pub use fault::{BoxError, Fault, HttpError};
pub use futures_util::future::BoxFuture;
pub use interceptor::{
    exception_fn, interceptor_fn, ExceptionHandler, Handler, HandlerResult, Interceptor, Interceptors, Outcome,
};
pub use pipeline::Dispatcher;
pub use reply::{Reply, Response};
pub use request::{RequestId, X_REQUEST_ID};
pub use server::{Server, ServerError};
pub use session::{MemorySessionManager, Session, SessionManager};
