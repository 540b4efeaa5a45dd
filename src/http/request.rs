//! Request identification.
//!
//! # Responsibilities
//! - Assign every request a unique id (UUID v4)
//! - Honour a well-formed incoming `x-request-id`
//! - Echo the id on the response for correlation
//!
//! # Design Decisions
//! - Request ID assigned before any interceptor runs
//! - Malformed incoming ids are replaced, never trusted

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use uuid::Uuid;

use crate::http::reply::Response;

/// Header carrying the request id.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Reuse the incoming `x-request-id` when it is a UUID.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Set the id header on `response`.
    pub fn stamp(&self, response: &mut Response) {
        if let Ok(value) = HeaderValue::from_str(&self.0.to_string()) {
            response.headers_mut().insert(X_REQUEST_ID, value);
        }
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    use crate::http::reply;

    #[test]
    fn ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn malformed_incoming_id_is_replaced() {
        let mut headers = HeaderMap::new();
        headers.insert(X_REQUEST_ID, HeaderValue::from_static("not-a-uuid"));
        let id = RequestId::from_headers(&headers);
        assert_ne!(id.to_string(), "not-a-uuid");
    }

    #[test]
    fn stamp_sets_header() {
        let id = RequestId::new();
        let mut response = reply::empty(StatusCode::OK);
        id.stamp(&mut response);
        assert_eq!(response.headers()[X_REQUEST_ID], id.to_string().as_str());
    }
}
