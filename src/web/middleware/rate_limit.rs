//! Per-IP rate limiting for the login endpoint.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{
    collections::HashMap,
    net::SocketAddr,
    num::NonZeroU32,
    sync::{Arc, PoisonError, RwLock},
};

use crate::web::error::{ApiError, ErrorCode};

/// Per-IP rate limiter using Governor.
pub type IpRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// State for login rate limiting.
pub struct RateLimitState {
    limiters: RwLock<HashMap<String, Arc<IpRateLimiter>>>,
    quota: Quota,
}

impl RateLimitState {
    /// Create a limiter allowing `requests_per_minute` login attempts per IP.
    pub fn new(requests_per_minute: u32) -> Self {
        let burst = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            limiters: RwLock::new(HashMap::new()),
            quota: Quota::per_minute(burst),
        }
    }

    fn limiter_for(&self, ip: &str) -> Arc<IpRateLimiter> {
        {
            let read_guard = self.limiters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(limiter) = read_guard.get(ip) {
                return Arc::clone(limiter);
            }
        }

        let mut write_guard = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            write_guard
                .entry(ip.to_string())
                .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota))),
        )
    }

    /// Check whether a login attempt from `ip` is allowed.
    pub fn check(&self, ip: &str) -> bool {
        self.limiter_for(ip).check().is_ok()
    }

    /// Drop limiters that are not currently in use.
    pub fn cleanup(&self) {
        let mut guard = self.limiters.write().unwrap_or_else(PoisonError::into_inner);
        guard.retain(|_, v| Arc::strong_count(v) > 1);
    }
}

/// Extract client IP from request.
fn client_ip(req: &Request<Body>) -> String {
    if let Some(forwarded) = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(ip) = forwarded.split(',').next() {
            return ip.trim().to_string();
        }
    }

    if let Some(real_ip) = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
    {
        return real_ip.to_string();
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// Rate limiting middleware for the login endpoint.
pub async fn login_rate_limit(
    state: Arc<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(&req);

    if !state.check(&ip) {
        tracing::warn!(ip = %ip, "Login rate limit exceeded");
        return ApiError::new(
            ErrorCode::TooManyRequests,
            "Too many login attempts. Please try again later.",
        )
        .into_response();
    }

    next.run(req).await
}
