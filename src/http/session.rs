//! Session management.
//!
//! # Responsibilities
//! - Define the pluggable `SessionManager` interface
//! - Provide an in-memory, cookie-keyed default implementation
//!
//! # Design Decisions
//! - Sessions load lazily, on the first `ctx.session()` call
//! - The pipeline calls `write` only when the context's dirty flag is set
//! - Clearing all data destroys the session and expires the cookie

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::http::{Context, Fault};

/// Session data attached to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: Option<String>,
    data: Map<String, Value>,
}

impl Session {
    pub fn new(id: Option<String>, data: Map<String, Value>) -> Self {
        Self { id, data }
    }

    /// Identifier, once the session has been persisted.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Typed read of `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<(), Fault> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reads and persists sessions for requests.
pub trait SessionManager: Send + Sync + 'static {
    /// Load the session for the request in `ctx`.
    fn read<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<Session, Fault>>;

    /// Persist `ctx`'s session; the response is staged in `ctx` at this point.
    fn write<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Fault>>;
}

impl<T: SessionManager + ?Sized> SessionManager for Arc<T> {
    fn read<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<Session, Fault>> {
        (**self).read(ctx)
    }

    fn write<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Fault>> {
        (**self).write(ctx)
    }
}

/// Process-local session store keyed by a cookie.
#[derive(Debug)]
pub struct MemorySessionManager {
    cookie_name: String,
    store: DashMap<String, Map<String, Value>>,
}

impl MemorySessionManager {
    pub fn new(cookie_name: impl Into<String>) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            store: DashMap::new(),
        }
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn session_id(&self, ctx: &Context) -> Option<String> {
        ctx.headers()
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.cookie_name)
            .map(|(_, value)| value.to_string())
    }

    fn set_cookie(&self, ctx: &mut Context, value: String) -> Result<(), Fault> {
        let cookie = HeaderValue::from_str(&value)?;
        if let Some(response) = ctx.response_mut() {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
        Ok(())
    }
}

impl Default for MemorySessionManager {
    fn default() -> Self {
        Self::new("sid")
    }
}

impl SessionManager for MemorySessionManager {
    fn read<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<Session, Fault>> {
        Box::pin(async move {
            let session = self
                .session_id(ctx)
                .and_then(|id| self.store.get(&id).map(|data| Session::new(Some(id), data.clone())))
                .unwrap_or_default();
            Ok(session)
        })
    }

    fn write<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Result<(), Fault>> {
        Box::pin(async move {
            let Some(session) = ctx.loaded_session().cloned() else {
                return Ok(());
            };

            match (session.id(), session.is_empty()) {
                (Some(id), true) => {
                    self.store.remove(id);
                    let expired = format!("{}=; Path=/; HttpOnly; Max-Age=0", self.cookie_name);
                    self.set_cookie(ctx, expired)?;
                }
                (Some(id), false) => {
                    self.store.insert(id.to_string(), session.data().clone());
                }
                (None, true) => {}
                (None, false) => {
                    let id = Uuid::new_v4().to_string();
                    self.store.insert(id.clone(), session.data().clone());
                    let cookie = format!("{}={}; Path=/; HttpOnly", self.cookie_name, id);
                    self.set_cookie(ctx, cookie)?;
                    if let Some(loaded) = ctx.loaded_session_mut() {
                        loaded.set_id(id);
                    }
                }
            }
            Ok(())
        })
    }
}
