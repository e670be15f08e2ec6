//! Fixed-window rate limiting keyed by client identity.

use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::observability::metrics;

/// Key used when no client identity can be derived.
pub const ANONYMOUS_CLIENT: &str = "anonymous";

/// Counter for one client's current window.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    started: Instant,
}

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Admitted; `remaining` calls are left in the current window.
    Allowed { remaining: u32 },
    /// Rejected until the current window elapses.
    Limited { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// Per-client fixed-window limiter.
///
/// The map's shard lock is only taken to find or create a key; the counter
/// itself is guarded by a per-key mutex.
pub struct RateLimiter {
    windows: DashMap<String, Mutex<RateWindow>>,
    calls: u32,
    period: Duration,
}

impl RateLimiter {
    pub fn new(calls: u32, period: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            calls,
            period,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.calls, config.period())
    }

    /// Whether a call from `key` may proceed now.
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    /// Evaluate a call from `key` arriving at `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.calls == 0 {
            return RateDecision::Limited {
                retry_after: self.period,
            };
        }

        if let Some(window) = self.windows.get(key) {
            return self.admit(&window, now);
        }

        let window = self
            .windows
            .entry(key.to_owned())
            .or_insert_with(|| {
                Mutex::new(RateWindow {
                    count: 0,
                    started: now,
                })
            })
            .downgrade();
        self.admit(&window, now)
    }

    fn admit(&self, window: &Mutex<RateWindow>, now: Instant) -> RateDecision {
        let mut window = window.lock().unwrap_or_else(PoisonError::into_inner);

        // A call exactly at the boundary belongs to the new window.
        if window.count == 0 || now.saturating_duration_since(window.started) >= self.period {
            window.count = 1;
            window.started = now;
            return RateDecision::Allowed {
                remaining: self.calls - 1,
            };
        }

        if window.count >= self.calls {
            let elapsed = now.saturating_duration_since(window.started);
            return RateDecision::Limited {
                retry_after: self.period.saturating_sub(elapsed),
            };
        }

        window.count += 1;
        RateDecision::Allowed {
            remaining: self.calls - window.count,
        }
    }

    /// Drop windows whose period has elapsed. Returns how many were removed.
    pub fn evict_stale(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            let window = window.get_mut().unwrap_or_else(PoisonError::into_inner);
            now.saturating_duration_since(window.started) < self.period
        });
        let evicted = before.saturating_sub(self.windows.len());
        metrics::record_rate_limit_keys(self.windows.len());
        evicted
    }

    /// Number of clients with a live or stale window.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Shared state for the rate limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: std::sync::Arc<RateLimiter>,
    pub enabled: bool,
    pub trust_forwarded_for: bool,
}

/// Derive the client key for `request`.
pub fn client_key(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

/// Admission gate in front of every route.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let key = client_key(&request, state.trust_forwarded_for);
    match state.limiter.check(&key) {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Limited { retry_after } => {
            tracing::debug!(client = %key, retry_after_ms = retry_after.as_millis() as u64, "Rate limit exceeded");
            metrics::record_rate_limited();
            ApiError::RateLimited { retry_after }.into_response()
        }
    }
}
