//! Per-route middleware chain builder.
//!
//! # Responsibilities
//! - Collect the stages a route needs
//! - Apply them in the canonical order (or an explicit, validated deviation)
//! - Produce an immutable `MethodRouter`
//!
//! # Design Decisions
//! - Canonical order: allowed_methods → trace → content_limit → timeout →
//!   auth_required → rate_limit → handler
//! - `finish` consumes the builder; nothing can be added afterwards
//! - Rate limiting runs after authentication so limits are per user when possible

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::handler::Handler;
use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::routing::{any, MethodRouter};
use thiserror::Error;

use crate::auth::TokenVerifier;
use crate::config::ScopeLimit;
use crate::http::middleware::auth::auth_required;
use crate::http::middleware::timeout::{timeout, RouteTimeout};
use crate::http::middleware::trace::{trace, RouteLabel};
use crate::http::server::AppState;
use crate::security::limits::{allowed_methods, content_limit, AllowedMethods, ContentLimit};
use crate::security::rate_limit::{rate_limit, RateLimitRule, RateLimiter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    AllowedMethods,
    Trace,
    ContentLimit,
    Timeout,
    AuthRequired,
    RateLimit,
}

impl Stage {
    pub const CANONICAL: [Stage; 6] = [
        Stage::AllowedMethods,
        Stage::Trace,
        Stage::ContentLimit,
        Stage::Timeout,
        Stage::AuthRequired,
        Stage::RateLimit,
    ];
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("route {route}: reorder must list each configured stage exactly once (got {given:?}, configured {configured:?})")]
    NotAPermutation {
        route: &'static str,
        given: Vec<Stage>,
        configured: Vec<Stage>,
    },
}

/// Builder for one route's middleware pipeline.
#[derive(Debug, Clone)]
pub struct RouteChain {
    route: &'static str,
    methods: Option<Arc<[Method]>>,
    trace: bool,
    content_limit: Option<usize>,
    timeout: Option<Duration>,
    auth: Option<TokenVerifier>,
    rate_limit: Option<RateLimitRule>,
    order: Option<Vec<Stage>>,
}

impl RouteChain {
    pub fn new(route: &'static str) -> Self {
        Self {
            route,
            methods: None,
            trace: false,
            content_limit: None,
            timeout: None,
            auth: None,
            rate_limit: None,
            order: None,
        }
    }

    pub fn allowed_methods(mut self, methods: &[Method]) -> Self {
        self.methods = Some(methods.to_vec().into());
        self
    }

    pub fn trace(mut self) -> Self {
        self.trace = true;
        self
    }

    pub fn content_limit(mut self, bytes: usize) -> Self {
        self.content_limit = Some(bytes);
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn auth_required(mut self, verifier: TokenVerifier) -> Self {
        self.auth = Some(verifier);
        self
    }

    pub fn rate_limit(mut self, limiter: RateLimiter, scope: &'static str, limit: ScopeLimit) -> Self {
        self.rate_limit = Some(RateLimitRule {
            limiter,
            scope,
            limit,
        });
        self
    }

    /// Stages configured so far, in canonical order.
    pub fn configured(&self) -> Vec<Stage> {
        Stage::CANONICAL
            .into_iter()
            .filter(|stage| self.has(*stage))
            .collect()
    }

    fn has(&self, stage: Stage) -> bool {
        match stage {
            Stage::AllowedMethods => self.methods.is_some(),
            Stage::Trace => self.trace,
            Stage::ContentLimit => self.content_limit.is_some(),
            Stage::Timeout => self.timeout.is_some(),
            Stage::AuthRequired => self.auth.is_some(),
            Stage::RateLimit => self.rate_limit.is_some(),
        }
    }

    /// Declare a non-canonical order, outermost first. Must be a permutation
    /// of the configured stages.
    pub fn reorder(mut self, order: &[Stage]) -> Result<Self, ChainError> {
        let configured = self.configured();
        let mut sorted = order.to_vec();
        sorted.sort_by_key(|s| Stage::CANONICAL.iter().position(|c| c == s));
        if sorted != configured {
            return Err(ChainError::NotAPermutation {
                route: self.route,
                given: order.to_vec(),
                configured,
            });
        }
        self.order = Some(order.to_vec());
        Ok(self)
    }

    /// Effective order, outermost first.
    pub fn order(&self) -> Vec<Stage> {
        self.order.clone().unwrap_or_else(|| self.configured())
    }

    /// Terminate the chain with `handler`.
    pub fn finish<H, T>(self, handler: H) -> MethodRouter<AppState>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let order = self.order();
        let mut router = any(handler);

        // The last layer applied is the outermost.
        for stage in order.into_iter().rev() {
            router = match stage {
                Stage::AllowedMethods => match &self.methods {
                    Some(methods) => router.layer(from_fn_with_state(
                        AllowedMethods(methods.clone()),
                        allowed_methods,
                    )),
                    None => router,
                },
                Stage::Trace => router.layer(from_fn_with_state(RouteLabel(self.route), trace)),
                Stage::ContentLimit => match self.content_limit {
                    Some(limit) => router
                        .layer(DefaultBodyLimit::max(limit))
                        .layer(from_fn_with_state(ContentLimit(limit), content_limit)),
                    None => router,
                },
                Stage::Timeout => match self.timeout {
                    Some(limit) => router.layer(from_fn_with_state(RouteTimeout(limit), timeout)),
                    None => router,
                },
                Stage::AuthRequired => match &self.auth {
                    Some(verifier) => {
                        router.layer(from_fn_with_state(verifier.clone(), auth_required))
                    }
                    None => router,
                },
                Stage::RateLimit => match &self.rate_limit {
                    Some(rule) => router.layer(from_fn_with_state(rule.clone(), rate_limit)),
                    None => router,
                },
            };
        }
        router
    }
}
