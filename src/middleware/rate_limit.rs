//! Per-client token bucket rate limiting.
//!
//! Each client key owns a bucket holding at most `burst` tokens, refilled at
//! `rps` tokens per second. Every request refreshes the client's `last_seen`
//! whether or not it is admitted, and a background sweep drops clients that
//! have been idle longer than [`IDLE_TIMEOUT`].

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::LimiterConfig;
use crate::error::ApiError;
use crate::middleware::real_ip::ClientIp;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Starts full.
    pub fn new(capacity: u32, refill_per_sec: f64, now: Instant) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec,
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[derive(Debug)]
struct ClientState {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Client table shared between the request path and the sweeper. The lock is
/// held only for a single lookup/refill/consume or a single sweep.
#[derive(Debug)]
pub struct RateLimiter {
    rps: f64,
    burst: u32,
    clients: Mutex<HashMap<IpAddr, ClientState>>,
}

impl RateLimiter {
    pub fn new(rps: f64, burst: u32) -> Self {
        Self {
            rps,
            burst,
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::new(config.rps, config.burst)
    }

    pub fn check(&self, key: IpAddr) -> bool {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let client = clients.entry(key).or_insert_with(|| ClientState {
            bucket: TokenBucket::new(self.burst, self.rps, now),
            last_seen: now,
        });
        client.last_seen = now;
        client.bucket.try_acquire(now)
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drops clients idle for longer than [`IDLE_TIMEOUT`]; returns how many.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, c| now.saturating_duration_since(c.last_seen) <= IDLE_TIMEOUT);
        before - clients.len()
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: IpAddr) -> bool {
        self.clients.lock().contains_key(&key)
    }

    /// Runs the idle sweep every [`SWEEP_INTERVAL`] until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, tracker: &TaskTracker, cancel: CancellationToken) {
        let limiter = Arc::clone(self);
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("rate limiter sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = limiter.len(), "evicted idle rate limit clients");
                        }
                    }
                }
            }
        });
    }
}

pub async fn rate_limit(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let ip = request
        .extensions()
        .get::<ClientIp>()
        .map(|ClientIp(ip)| *ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !limiter.check(ip) {
        tracing::warn!(client = %ip, "rate limit exceeded");
        return ApiError::TooManyRequests.into_response();
    }

    next.run(request).await
}
