//! Per-request state.
//!
//! A `Context` is created for every inbound request after the route lookup and
//! dropped once the response has been handed to the connection. It owns the
//! buffered request, the staged response, the lazily loaded session and this
//! request's own copies of the interceptor lists.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderMap, Method, Request, StatusCode, Uri};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::Span;

use crate::http::codec::CodecRegistry;
use crate::http::interceptor::{ExceptionHandler, Interceptor, Interceptors};
use crate::http::reply::Response;
use crate::http::request::RequestId;
use crate::http::session::{MemorySessionManager, Session, SessionManager};
use crate::http::Fault;
use crate::routing::Params;

pub struct Context {
    id: RequestId,
    request: Request<Bytes>,
    peer: Option<SocketAddr>,
    params: Params,
    route_pattern: Option<String>,
    response: Option<Response>,
    session: Option<Session>,
    session_needs_update: bool,
    sessions: Arc<dyn SessionManager>,
    codecs: Arc<CodecRegistry>,
    pub(crate) before: Vec<Arc<dyn Interceptor>>,
    pub(crate) after: Vec<Arc<dyn Interceptor>>,
    pub(crate) on_exception: Vec<Arc<dyn ExceptionHandler>>,
    span: Span,
}

impl Context {
    /// Standalone context with an in-memory session store and the default codecs.
    pub fn new(request: Request<Bytes>) -> Self {
        Self::with_services(
            request,
            Arc::new(MemorySessionManager::default()),
            Arc::new(CodecRegistry::default()),
            &Span::none(),
        )
    }

    pub(crate) fn with_services(
        request: Request<Bytes>,
        sessions: Arc<dyn SessionManager>,
        codecs: Arc<CodecRegistry>,
        parent: &Span,
    ) -> Self {
        let id = RequestId::from_headers(request.headers());
        let span = tracing::info_span!(
            parent: parent,
            "request",
            request_id = %id,
            method = %request.method(),
            path = %request.uri().path(),
        );
        Self {
            id,
            request,
            peer: None,
            params: Params::default(),
            route_pattern: None,
            response: None,
            session: None,
            session_needs_update: false,
            sessions,
            codecs,
            before: Vec::new(),
            after: Vec::new(),
            on_exception: Vec::new(),
            span,
        }
    }

    pub(crate) fn set_peer(&mut self, peer: Option<SocketAddr>) {
        self.peer = peer;
    }

    pub(crate) fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    pub(crate) fn set_route_pattern(&mut self, pattern: impl Into<String>) {
        self.route_pattern = Some(pattern.into());
    }

    /// Copy `lists` into this request's own interceptor lists.
    pub(crate) fn install(&mut self, lists: &Interceptors) {
        self.before = lists.before.clone();
        self.after = lists.after.clone();
        self.on_exception = lists.on_exception.clone();
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request(&self) -> &Request<Bytes> {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request<Bytes> {
        &mut self.request
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn uri(&self) -> &Uri {
        self.request.uri()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn query(&self) -> Option<&str> {
        self.request.uri().query()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.headers().get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        self.request.body()
    }

    /// Address of the client, when the request came over a socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Path parameter captured by the route pattern.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Pattern of the matched route, e.g. `/users/:id`. `None` for 404/405.
    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    /// Span carrying this request's id, method and path.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Decode the body with the codec for its `Content-Type`.
    pub fn decode_body(&self) -> Result<Value, Fault> {
        let codec = self
            .codecs
            .resolve(self.header(header::CONTENT_TYPE.as_str()))
            .map_err(|e| Fault::status(StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string()))?;
        codec
            .decode(self.body())
            .map_err(|e| Fault::status(StatusCode::BAD_REQUEST, e.to_string()))
    }

    /// Decode the body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, Fault> {
        serde_json::from_value(self.decode_body()?)
            .map_err(|e| Fault::status(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
    }

    /// Encode `value` as `mime` into a response with `status`.
    pub fn encode(&self, status: StatusCode, mime: &str, value: &Value) -> Result<Response, Fault> {
        let codec = self
            .codecs
            .get(mime)
            .ok_or_else(|| Fault::status(StatusCode::NOT_ACCEPTABLE, format!("cannot produce {mime}")))?;
        let mut response = Response::new(codec.encode(value)?);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, header::HeaderValue::from_static(codec.mime()));
        Ok(response)
    }

    /// The session, loaded through the session manager on first use.
    pub async fn session(&mut self) -> Result<&Session, Fault> {
        self.load_session().await?;
        Ok(self.session.get_or_insert_with(Session::default))
    }

    /// Mutable session access; marks the session for writing.
    pub async fn session_mut(&mut self) -> Result<&mut Session, Fault> {
        self.load_session().await?;
        self.session_needs_update = true;
        Ok(self.session.get_or_insert_with(Session::default))
    }

    async fn load_session(&mut self) -> Result<(), Fault> {
        if self.session.is_none() {
            let sessions = Arc::clone(&self.sessions);
            let session = sessions.read(self).await?;
            self.session = Some(session);
        }
        Ok(())
    }

    /// Session if it has been loaded or set, without touching the manager.
    pub fn loaded_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn loaded_session_mut(&mut self) -> Option<&mut Session> {
        self.session.as_mut()
    }

    /// Replace the session and mark it for writing.
    pub fn set_session(&mut self, session: Session) {
        self.session = Some(session);
        self.session_needs_update = true;
    }

    pub fn mark_session_dirty(&mut self) {
        self.session_needs_update = true;
    }

    pub fn session_needs_update(&self) -> bool {
        self.session_needs_update
    }

    pub(crate) fn session_manager(&self) -> Arc<dyn SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Staged response; set while after-interceptors and the session write run.
    pub fn response(&self) -> Option<&Response> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut Response> {
        self.response.as_mut()
    }

    /// Stage a response. Handlers returning `Reply::Skip` stage the head to send.
    pub fn set_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    pub(crate) fn take_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    /// Run `interceptor` after the current before-interceptors.
    pub fn add_before(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.before.push(interceptor);
    }

    pub fn add_after(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.after.push(interceptor);
    }

    pub fn add_on_exception(&mut self, handler: Arc<dyn ExceptionHandler>) {
        self.on_exception.push(handler);
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .field("params", &self.params)
            .field("session_needs_update", &self.session_needs_update)
            .finish_non_exhaustive()
    }
}
