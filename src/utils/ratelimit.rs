use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{config::RateLimitConfig, state::AppState, utils::errorhandler::AppError};

const CLEANUP_EVERY: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: Instant,
}

impl RateLimitDecision {
    /// Whole seconds until the window resets, rounded up.
    pub fn retry_after(&self, now: Instant) -> u64 {
        let left = self.reset_at.saturating_duration_since(now);
        left.as_secs() + u64::from(left.subsec_nanos() > 0)
    }
}

/// Fixed-window request counter shared across handlers.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitDecision {
        self.check_at(key, config, Instant::now())
    }

    pub fn check_at(&self, key: &str, config: &RateLimitConfig, now: Instant) -> RateLimitDecision {
        let mut entry = self.windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + config.window,
        });

        if entry.reset_at <= now {
            *entry = Window { count: 0, reset_at: now + config.window };
        }

        if entry.count >= config.max_requests {
            return RateLimitDecision { allowed: false, remaining: 0, reset_at: entry.reset_at };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: config.max_requests - entry.count,
            reset_at: entry.reset_at,
        }
    }

    /// Turns a refusal into a 429.
    pub fn enforce(&self, key: &str, config: &RateLimitConfig) -> Result<RateLimitDecision, AppError> {
        let decision = self.check(key, config);
        if !decision.allowed {
            warn!(key = %key, "rate limit exceeded");
            return Err(AppError::too_many_requests("Too many requests, please try again later"));
        }
        Ok(decision)
    }

    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| w.reset_at > now);
        before - self.windows.len()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Background task that drops windows that have already reset.
pub async fn run_cleanup(limiter: Arc<RateLimiter>) {
    let mut interval = tokio::time::interval(CLEANUP_EVERY);
    loop {
        interval.tick().await;
        let purged = limiter.purge_expired(Instant::now());
        if purged > 0 {
            debug!("purged {purged} expired rate limit windows");
        }
    }
}

/// Caller address as reported by the proxy in front of us.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Per-IP limit for everything mounted under `/api`.
pub async fn limit_api(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = format!("api:{}", client_ip(request.headers()));
    let decision = state.rate_limiter.check(&key, &state.config.api_rate_limit);
    if !decision.allowed {
        warn!(key = %key, "rate limit exceeded");
        let mut response = AppError::too_many_requests("Too many requests, please try again later").into_response();
        if let Ok(value) = HeaderValue::from_str(&decision.retry_after(Instant::now()).to_string()) {
            response.headers_mut().insert(RETRY_AFTER, value);
        }
        return response;
    }
    next.run(request).await
}
