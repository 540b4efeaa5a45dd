//! Switchyard: an embeddable HTTP/1.1 application server.
//!
//! Routes live in a tree with literal, regex and parameter segments. Each
//! request runs through before-interceptors, the handler, on-exception
//! handlers and after-interceptors, with lazily loaded sessions and pluggable
//! error pages. A server listens on any number of plain or TLS endpoints.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::ServerConfig;
pub use http::{Context, Fault, Outcome, Reply, Server, ServerError};
pub use net::ConnectTo;
pub use routing::{Group, Route};
