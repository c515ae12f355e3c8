use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::{error::AppError, state::AppState};

const WINDOW_SECS: u64 = 60;

struct ClientEntry {
    count: u32,
    window_start: Instant,
}

/// Fixed-window per-client limiter keyed by caller identity (bearer token
/// when present, client IP otherwise).
#[derive(Clone)]
pub struct RateLimiter {
    max_per_minute: u32,
    inner: Arc<DashMap<String, ClientEntry>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max_per_minute,
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Returns `true` if the request is allowed.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.inner.entry(key.to_owned()).or_insert_with(|| ClientEntry {
            count: 0,
            window_start: now,
        });

        if now.duration_since(entry.window_start).as_secs() >= WINDOW_SECS {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        entry.count <= self.max_per_minute
    }

    /// Drop windows idle for more than five minutes.
    pub fn cleanup(&self) {
        let cutoff = std::time::Duration::from_secs(300);
        let now = Instant::now();
        self.inner
            .retain(|_, entry| now.duration_since(entry.window_start) < cutoff);
    }
}

fn client_key(request: &Request) -> String {
    if let Some(auth) = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return auth.to_owned();
    }
    request
        .headers()
        .get("x-real-ip")
        .or_else(|| request.headers().get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.split(',').next_back().unwrap_or(s).trim().to_owned())
        .unwrap_or_else(|| "unknown".to_owned())
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    if !state.rate_limiter.check(&key) {
        tracing::warn!(client = %key_preview(&key), "rate limit exceeded");
        return AppError::RateLimited.into_response();
    }
    next.run(request).await
}

fn key_preview(key: &str) -> &str {
    // Bearer tokens should not land in logs whole.
    key.get(..key.len().min(24)).unwrap_or("<binary>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.check("client"));
        assert!(limiter.check("client"));
        assert!(limiter.check("client"));
        assert!(!limiter.check("client"));
        // Other clients are unaffected.
        assert!(limiter.check("other"));
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_a_minute() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.check("client"));
        assert!(!limiter.check("client"));

        tokio::time::advance(std::time::Duration::from_secs(61)).await;
        assert!(limiter.check("client"));
    }
}
