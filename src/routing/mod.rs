//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (before serve):
//!     Route / Group
//!     → pattern.rs (parse "/users/:id(\d+)" into segment specs)
//!     → tree.rs (insert into the trie, reject duplicates)
//!
//! Dispatch (per request):
//!     path + method
//!     → tree.rs (walk segments: literal > regex > parameter)
//!     → Found { endpoint, params } | MethodNotAllowed { allowed } | NotFound
//! ```
//!
//! # Design Decisions
//! - Tree frozen when the server starts serving (shared via Arc, no locks)
//! - Parameter names live on the endpoint, so routes may name a shared slot differently
//! - Regexes compiled once at registration, anchored to the whole segment
//! - "Method not allowed" reported separately from "not found"

pub mod group;
pub mod pattern;
pub mod route;
pub mod tree;

pub use group::Group;
pub use pattern::{decode_segment, parse_pattern, split_path, SegmentSpec};
pub use route::{Endpoint, Route};
pub use tree::{Lookup, Params, RouteTree};

use axum::http::Method;

/// Error raised while registering a route.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The pattern could not be parsed.
    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A handler already exists for this (path, method) pair.
    #[error("duplicate route {method} {pattern}")]
    Duplicate { method: Method, pattern: String },

    /// Two different regexes were registered for the same tree position.
    #[error("route `{pattern}` conflicts with existing segment pattern `{existing}`")]
    ConflictingPattern { pattern: String, existing: String },

    /// The route was registered without any HTTP method.
    #[error("route `{0}` has no HTTP methods")]
    NoMethods(String),
}
