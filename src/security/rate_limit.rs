//! Request throttling as a before-interceptor.
//!
//! Buckets are keyed by the matched route pattern unless a key function is
//! given, so one instance installed as a server default still limits `/one`
//! and `/two` independently.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use dashmap::DashMap;
use futures_util::future::BoxFuture;

use crate::http::reply;
use crate::http::{Context, Fault, Interceptor, Outcome};
use crate::observability::metrics;

pub const LIMIT_EXCEEDED: &str = "Limit exceeded";

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

type KeyFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// Allows `limit` requests per `window` for each key, refilling continuously.
///
/// Without a key function each route pattern gets its own bucket; unmatched
/// requests share one.
pub struct Throttle {
    capacity: f64,
    refill_rate: f64,
    key: Option<KeyFn>,
    buckets: DashMap<String, TokenBucket>,
}

impl Throttle {
    pub fn new(limit: u32, window: Duration) -> Self {
        let capacity = f64::from(limit);
        let window = window.as_secs_f64();
        Self {
            capacity,
            refill_rate: if window > 0.0 { capacity / window } else { f64::INFINITY },
            key: None,
            buckets: DashMap::new(),
        }
    }

    /// One bucket per client IP.
    pub fn per_client(self) -> Self {
        self.keyed_by(|ctx| {
            ctx.peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "unknown".to_string())
        })
    }

    pub fn keyed_by(mut self, key: impl Fn(&Context) -> String + Send + Sync + 'static) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    /// Take a token for `key`; false when the bucket is empty.
    pub fn check(&self, key: &str) -> bool {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity));
        bucket.try_acquire(self.capacity, self.refill_rate)
    }

    fn key_for(&self, ctx: &Context) -> String {
        match &self.key {
            Some(key) => key(ctx),
            None => ctx.route_pattern().unwrap_or_default().to_string(),
        }
    }
}

impl Interceptor for Throttle {
    fn intercept<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let key = self.key_for(ctx);
            if self.check(&key) {
                return Outcome::Continue;
            }
            tracing::warn!(key = %key, path = %ctx.path(), "Rate limit exceeded");
            metrics::record_throttled();
            Outcome::Fault(Fault::reply(reply::text(StatusCode::TOO_MANY_REQUESTS, LIMIT_EXCEEDED)))
        })
    }

    fn name(&self) -> &str {
        "throttle"
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle")
            .field("capacity", &self.capacity)
            .field("refill_rate", &self.refill_rate)
            .field("keys", &self.buckets.len())
            .finish()
    }
}
