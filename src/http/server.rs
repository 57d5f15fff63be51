//! HTTP server setup.
//!
//! # Responsibilities
//! - Assemble the application state handed to every handler
//! - Declare each route with its middleware chain
//! - Apply the root layers (panic recovery, request id, ingress context)
//! - Serve until shutdown is triggered, then drain
//!
//! # Design Decisions
//! - Route chains are built once at startup and never mutated
//! - Unknown routes and panics still answer in the JSON error format
//! - Connect info is always attached so rate limiting can fall back to the peer IP

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::auth::TokenVerifier;
use crate::cache::CacheClient;
use crate::config::GatewayConfig;
use crate::context::KeySet;
use crate::http::handlers::{self, health, profile, session, users};
use crate::http::middleware::ingress::ingress;
use crate::http::middleware::RouteChain;
use crate::http::response::ApiError;
use crate::http::websocket;
use crate::lifecycle::Shutdown;
use crate::rpc::{PostsApi, UsersApi};
use crate::security::rate_limit::RateLimiter;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub keys: KeySet,
    pub users: Arc<dyn UsersApi>,
    pub posts: Arc<dyn PostsApi>,
    pub verifier: TokenVerifier,
    pub limiter: RateLimiter,
    pub shutdown: Arc<Shutdown>,
}

impl AppState {
    /// State whose verifier and limiter share `cache`.
    pub fn new(
        config: Arc<GatewayConfig>,
        keys: KeySet,
        users: Arc<dyn UsersApi>,
        posts: Arc<dyn PostsApi>,
        cache: CacheClient,
        shutdown: Arc<Shutdown>,
    ) -> Self {
        let verifier = TokenVerifier::new(&config.auth, cache.clone());
        let limiter = RateLimiter::new(cache, &config.rate_limit);
        Self {
            config,
            keys,
            users,
            posts,
            verifier,
            limiter,
            shutdown,
        }
    }
}

/// Build the gateway router with every route and root layer.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();
    let request_timeout = config.timeouts.request();
    let body_limit = config.listener.max_body_bytes;
    let limits = &config.rate_limit;

    let authed_get = |route: &'static str, scope: &'static str| {
        RouteChain::new(route)
            .allowed_methods(&[Method::GET])
            .trace()
            .timeout(request_timeout)
            .auth_required(state.verifier.clone())
            .rate_limit(state.limiter.clone(), scope, limits.limit_for(scope))
    };
    let public_post = |route: &'static str, scope: &'static str| {
        RouteChain::new(route)
            .allowed_methods(&[Method::POST])
            .trace()
            .content_limit(body_limit)
            .timeout(request_timeout)
            .rate_limit(state.limiter.clone(), scope, limits.limit_for(scope))
    };

    let health = RouteChain::new("/health")
        .allowed_methods(&[Method::GET])
        .trace()
        .finish(health::health);
    let ws = RouteChain::new("/ws")
        .allowed_methods(&[Method::GET])
        .trace()
        .auth_required(state.verifier.clone())
        .rate_limit(state.limiter.clone(), "ws", limits.limit_for("ws"))
        .finish(websocket::ws_upgrade);

    let user = authed_get("/user", "user").finish(users::get_user);
    let batch = authed_get("/users", "user").finish(users::get_users);
    let profile = authed_get("/profile", "user").finish(profile::get_profile);
    let login = public_post("/auth/login", "login").finish(session::login);
    let refresh = public_post("/auth/refresh", "refresh").finish(session::refresh);

    let keys = state.keys.clone();
    Router::new()
        .route("/health", health)
        .route("/user", user)
        .route("/users", batch)
        .route("/profile", profile)
        .route("/auth/login", login)
        .route("/auth/refresh", refresh)
        .route("/ws", ws)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(from_fn_with_state(keys, ingress))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::custom(panic_response))
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "Handler panicked");
    ApiError::internal().into_response()
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: build_router(state),
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` is triggered, then wait for
    /// in-flight requests to finish.
    pub async fn run(self, listener: TcpListener, shutdown: Arc<Shutdown>) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.triggered().await;
                tracing::info!("HTTP server draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
