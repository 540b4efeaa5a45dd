//! WebSocket upgrades.
//!
//! # Responsibilities
//! - Validate the client handshake headers
//! - Stage the `101 Switching Protocols` head on the context
//! - Hand the upgraded connection to a user task as a `WebSocketStream`
//!
//! # Data Flow
//! ```text
//! handler → upgrade(ctx, on_socket) → Reply::Skip
//!     pipeline writes the staged 101 head, no body, no session write
//!     hyper completes the upgrade → on_socket(WebSocketStream)
//! ```

use std::future::Future;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use hyper::upgrade::Upgraded;
use hyper_util::rt::TokioIo;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use tracing::Instrument;

use crate::http::interceptor::HandlerResult;
use crate::http::reply::{self, Reply};
use crate::http::{Context, Fault};

/// Server side of an upgraded WebSocket connection.
pub type WebSocket = WebSocketStream<TokioIo<Upgraded>>;

/// True when the request asks for a WebSocket upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    header_has_token(headers, header::CONNECTION, "upgrade") && header_has_token(headers, header::UPGRADE, "websocket")
}

fn header_has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Accept a WebSocket handshake and run `on_socket` once the upgrade completes.
pub fn upgrade<F, Fut>(ctx: &mut Context, on_socket: F) -> HandlerResult
where
    F: FnOnce(WebSocket) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if !is_upgrade_request(ctx.headers()) {
        return Err(Fault::status(StatusCode::BAD_REQUEST, "Expected WebSocket upgrade"));
    }
    if ctx.header(header::SEC_WEBSOCKET_VERSION.as_str()) != Some("13") {
        return Err(Fault::status(StatusCode::BAD_REQUEST, "Unsupported WebSocket version"));
    }
    let key = ctx
        .header(header::SEC_WEBSOCKET_KEY.as_str())
        .ok_or_else(|| Fault::status(StatusCode::BAD_REQUEST, "Missing Sec-WebSocket-Key"))?;
    let accept = HeaderValue::from_str(&derive_accept_key(key.as_bytes()))?;

    let on_upgrade = hyper::upgrade::on(ctx.request_mut());
    let span = ctx.span().clone();
    tokio::spawn(
        async move {
            match on_upgrade.await {
                Ok(upgraded) => {
                    let socket = WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None).await;
                    tracing::debug!("WebSocket established");
                    on_socket(socket).await;
                }
                Err(e) => tracing::debug!(error = %e, "WebSocket upgrade failed"),
            }
        }
        .instrument(span),
    );

    let mut head = reply::empty(StatusCode::SWITCHING_PROTOCOLS);
    let headers = head.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    ctx.set_response(head);
    Ok(Reply::Skip)
}
