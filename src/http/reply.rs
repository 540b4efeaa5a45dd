//! Response construction.
//!
//! # Responsibilities
//! - Response type shared by handlers, interceptors and the error writer
//! - Small constructors for text, JSON, empty and redirect responses
//! - Conversion to the streaming body type handed to hyper
//!
//! # Design Decisions
//! - Bodies are buffered `Bytes`, so responses can be cloned out of faults
//! - `Reply::Skip` tells the pipeline not to write a body (protocol upgrades)

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use bytes::Bytes;
use serde::Serialize;

use crate::http::Fault;

/// A fully buffered HTTP response.
pub type Response = axum::http::Response<Bytes>;

/// What a handler hands back to the pipeline.
#[derive(Debug)]
pub enum Reply {
    /// Write this response.
    Response(Response),
    /// The handler took over the connection; write only the staged head.
    Skip,
}

impl Reply {
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Reply::Response(text(status, body))
    }

    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Self, Fault> {
        json(status, value).map(Reply::Response)
    }

    pub fn empty(status: StatusCode) -> Self {
        Reply::Response(empty(status))
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

/// Plain-text response.
pub fn text(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = Response::new(Bytes::from(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// JSON response.
pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Result<Response, Fault> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(response)
}

/// Response with no body.
pub fn empty(status: StatusCode) -> Response {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// `303 See Other` pointing at `location`.
pub fn redirect(location: &str) -> Result<Response, Fault> {
    let mut response = empty(StatusCode::SEE_OTHER);
    response
        .headers_mut()
        .insert(header::LOCATION, HeaderValue::from_str(location)?);
    Ok(response)
}

/// Last-resort response when producing an error response failed.
pub fn internal_error() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub(crate) fn clone_response(source: &Response) -> Response {
    let mut response = Response::new(source.body().clone());
    *response.status_mut() = source.status();
    *response.version_mut() = source.version();
    *response.headers_mut() = source.headers().clone();
    *response.extensions_mut() = source.extensions().clone();
    response
}

pub(crate) fn into_body(response: Response) -> axum::http::Response<Body> {
    response.map(Body::from)
}
