//! Fixed-window rate limiting backed by the shared cache.
//!
//! # Responsibilities
//! - Count requests per `(scope, subject, window)` with an atomic increment
//! - Reject over-limit requests with 429 and `Retry-After`
//!
//! # Design Decisions
//! - Counters live in the cache so every gateway replica shares them
//! - The subject is the authenticated user when known, else the client IP
//! - Cache failures fail open: availability over strictness

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::cache::{CacheClient, CacheError};
use crate::config::{RateLimitConfig, ScopeLimit};
use crate::context::RequestContext;
use crate::http::request::context_of;
use crate::http::response::ApiError;
use crate::observability::metrics;

/// Source of "now" in whole seconds since the Unix epoch.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
    })
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { count: u64, limit: u64 },
    Limited { retry_after: u64 },
    /// The cache could not be consulted; the request is let through.
    Unchecked,
    /// The window counter left the u64 range. Never admitted.
    CounterOverflow,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Limited { .. } | Decision::CounterOverflow)
    }
}

/// Shared fixed-window limiter.
#[derive(Clone)]
pub struct RateLimiter {
    cache: CacheClient,
    enabled: bool,
    window_secs: u64,
    clock: Clock,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.enabled)
            .field("window_secs", &self.window_secs)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(cache: CacheClient, config: &RateLimitConfig) -> Self {
        Self {
            cache,
            enabled: config.enabled,
            window_secs: config.window_secs.max(1),
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Requests admitted per window for `limit`.
    pub fn threshold(&self, limit: ScopeLimit) -> u64 {
        u64::from(limit.rps) * self.window_secs + u64::from(limit.burst)
    }

    pub fn key(scope: &str, subject: &str, window_id: u64) -> String {
        format!("rl:{}:{}:{}", scope, subject, window_id)
    }

    /// Count one request for `subject` in `scope`.
    pub async fn check(
        &self,
        ctx: &RequestContext,
        scope: &str,
        subject: &str,
        limit: ScopeLimit,
    ) -> Decision {
        if !self.enabled {
            return Decision::Unchecked;
        }

        let now = (self.clock)();
        let window_id = now / self.window_secs;
        let key = Self::key(scope, subject, window_id);
        let threshold = self.threshold(limit);

        match self
            .cache
            .incr_ex(ctx, &key, Duration::from_secs(self.window_secs))
            .await
        {
            Ok(count) if count <= threshold => Decision::Allowed {
                count,
                limit: threshold,
            },
            Ok(_) => {
                let window_end = (window_id + 1) * self.window_secs;
                Decision::Limited {
                    retry_after: window_end.saturating_sub(now).max(1),
                }
            }
            Err(CacheError::Overflow(key)) => {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    scope,
                    key = %key,
                    "Rate limit counter overflowed"
                );
                Decision::CounterOverflow
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    scope,
                    error = %e,
                    "Rate limit check failed; allowing request"
                );
                Decision::Unchecked
            }
        }
    }
}

/// Per-route rate-limit stage configuration.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    pub limiter: RateLimiter,
    pub scope: &'static str,
    pub limit: ScopeLimit,
}

/// Subject for rate limiting: the principal when authenticated, else the peer IP.
pub fn subject_of(ctx: &RequestContext, peer: Option<SocketAddr>) -> String {
    match (ctx.principal(), peer) {
        (Some(principal), _) => format!("u{}", principal.user_id),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

pub async fn rate_limit(
    State(rule): State<RateLimitRule>,
    request: Request,
    next: Next,
) -> Response {
    let ctx = context_of(&request);
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let subject = subject_of(&ctx, peer);

    match rule.limiter.check(&ctx, rule.scope, &subject, rule.limit).await {
        Decision::Limited { retry_after } => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                scope = rule.scope,
                subject = %subject,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(rule.scope);
            ApiError::rate_limited(retry_after).into_response()
        }
        Decision::CounterOverflow => ApiError::internal().into_response(),
        Decision::Allowed { .. } | Decision::Unchecked => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KvStore, MemoryStore};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn limiter(now: Arc<AtomicU64>) -> RateLimiter {
        let cache = CacheClient::with_timeouts(
            Arc::new(MemoryStore::new()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        RateLimiter::new(cache, &RateLimitConfig::default())
            .with_clock(Arc::new(move || now.load(Ordering::SeqCst)))
    }

    #[tokio::test]
    async fn eleventh_request_in_window_is_limited() {
        let now = Arc::new(AtomicU64::new(1_000));
        let limiter = limiter(now.clone());
        let ctx = RequestContext::default();
        let limit = ScopeLimit { rps: 10, burst: 0 };

        for _ in 0..10 {
            assert!(limiter.check(&ctx, "user", "u1", limit).await.is_allowed());
        }
        assert_eq!(
            limiter.check(&ctx, "user", "u1", limit).await,
            Decision::Limited { retry_after: 1 }
        );

        // Other subjects and the next window are unaffected.
        assert!(limiter.check(&ctx, "user", "u2", limit).await.is_allowed());
        now.store(1_001, Ordering::SeqCst);
        assert!(limiter.check(&ctx, "user", "u1", limit).await.is_allowed());
    }

    #[tokio::test]
    async fn burst_extends_threshold() {
        let limiter = limiter(Arc::new(AtomicU64::new(5)));
        assert_eq!(limiter.threshold(ScopeLimit { rps: 5, burst: 3 }), 8);
    }

    #[tokio::test]
    async fn cache_failure_fails_open() {
        let cache = CacheClient::with_timeouts(
            Arc::new(MemoryStore::new()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        cache.close();
        let limiter = RateLimiter::new(cache, &RateLimitConfig::default());
        let decision = limiter
            .check(&RequestContext::default(), "login", "1.2.3.4", ScopeLimit { rps: 0, burst: 0 })
            .await;
        assert_eq!(decision, Decision::Unchecked);
    }

    #[tokio::test]
    async fn counter_overflow_is_refused() {
        let store = MemoryStore::new();
        let cache = CacheClient::with_timeouts(
            Arc::new(store.clone()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        let limiter = RateLimiter::new(cache, &RateLimitConfig::default())
            .with_clock(Arc::new(|| 5_000));
        store
            .set(
                &RateLimiter::key("user", "u1", 5_000),
                u64::MAX.to_string().into_bytes(),
                None,
            )
            .await
            .unwrap();

        let decision = limiter
            .check(&RequestContext::default(), "user", "u1", ScopeLimit { rps: 10, burst: 0 })
            .await;
        assert_eq!(decision, Decision::CounterOverflow);
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn counter_overflow_answers_internal_error() {
        use axum::body::Body;
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::Router;
        use tower::ServiceExt;

        let store = MemoryStore::new();
        let cache = CacheClient::with_timeouts(
            Arc::new(store.clone()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        );
        let rule = RateLimitRule {
            limiter: RateLimiter::new(cache, &RateLimitConfig::default())
                .with_clock(Arc::new(|| 5_000)),
            scope: "user",
            limit: ScopeLimit { rps: 10, burst: 0 },
        };
        store
            .set(
                &RateLimiter::key("user", "unknown", 5_000),
                u64::MAX.to_string().into_bytes(),
                None,
            )
            .await
            .unwrap();

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(rule, rate_limit));
        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn subject_prefers_principal() {
        let mut ctx = RequestContext::default();
        let peer: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        assert_eq!(subject_of(&ctx, Some(peer)), "10.0.0.1");
        assert_eq!(subject_of(&ctx, None), "unknown");
        ctx.set_principal(crate::context::Principal {
            user_id: 9,
            session_id: "s".into(),
            issued_at: 0,
            expires_at: 0,
        });
        assert_eq!(subject_of(&ctx, Some(peer)), "u9");
    }
}
