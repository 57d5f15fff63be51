//! Shared utilities for the integration tests: in-process fakes of the
//! downstream services, token minting and router assembly.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use tonic::metadata::MetadataMap;

use social_gateway::auth::verifier::{Claims, Subject};
use social_gateway::cache::{CacheClient, MemoryStore};
use social_gateway::config::GatewayConfig;
use social_gateway::context::{KeySet, RequestContext};
use social_gateway::http::{build_router, AppState};
use social_gateway::lifecycle::Shutdown;
use social_gateway::rpc::metadata::context_to_metadata;
use social_gateway::rpc::proto::{Post, TokenReply, User};
use social_gateway::rpc::{PostsApi, RpcError, UsersApi};
use social_gateway::security::rate_limit::RateLimiter;

pub const SECRET: &str = "integration-test-secret";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn mint_token(user_id: u64, session_id: &str) -> String {
    let claims = Claims {
        sub: Subject::Text(user_id.to_string()),
        sid: session_id.to_string(),
        iat: now(),
        exp: now() + 600,
        nbf: None,
        iss: None,
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.auth.secret = SECRET.to_string();
    config.timeouts.request_ms = 1_000;
    config.retries.enabled = false;
    config
}

/// What a downstream saw for one call.
#[derive(Debug, Clone)]
pub struct SeenCall {
    pub metadata: MetadataMap,
    pub ctx: RequestContext,
}

/// Behaviour of a fake downstream call.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub delay: Option<Duration>,
    pub failures: HashMap<u64, RpcError>,
    pub panic_on: Option<u64>,
}

#[derive(Debug, Default)]
pub struct FakeUsers {
    pub users: HashMap<u64, User>,
    pub script: Script,
    pub seen: Mutex<Vec<SeenCall>>,
}

impl FakeUsers {
    pub fn with_users(ids: &[u64]) -> Self {
        let users = ids
            .iter()
            .map(|&id| {
                (
                    id,
                    User {
                        id,
                        username: format!("user{}", id),
                        avatar: (id % 8) as u32,
                    },
                )
            })
            .collect();
        Self {
            users,
            ..Self::default()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn failing(mut self, id: u64, err: RpcError) -> Self {
        self.script.failures.insert(id, err);
        self
    }

    pub fn panicking(mut self, id: u64) -> Self {
        self.script.panic_on = Some(id);
        self
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.seen.lock().unwrap().clone()
    }

    async fn observe(&self, ctx: &RequestContext) {
        let mut metadata = MetadataMap::new();
        context_to_metadata(ctx, &mut metadata);
        self.seen.lock().unwrap().push(SeenCall {
            metadata,
            ctx: ctx.clone(),
        });
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl UsersApi for FakeUsers {
    async fn get_user(&self, ctx: &RequestContext, id: u64) -> Result<User, RpcError> {
        self.observe(ctx).await;
        if self.script.panic_on == Some(id) {
            panic!("fake users service exploded on {}", id);
        }
        if let Some(err) = self.script.failures.get(&id) {
            return Err(err.clone());
        }
        self.users
            .get(&id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("user {} not found", id)))
    }

    async fn login(
        &self,
        ctx: &RequestContext,
        username: String,
        password: String,
    ) -> Result<TokenReply, RpcError> {
        self.observe(ctx).await;
        if password != "correct horse" {
            return Err(RpcError::Unauthenticated("bad password".into()));
        }
        Ok(TokenReply {
            access_token: format!("access-{}", username),
            refresh_token: format!("refresh-{}", username),
            expires_in: 900,
        })
    }

    async fn refresh(
        &self,
        ctx: &RequestContext,
        refresh_token: String,
    ) -> Result<TokenReply, RpcError> {
        self.observe(ctx).await;
        match refresh_token.strip_prefix("refresh-") {
            Some(username) => Ok(TokenReply {
                access_token: format!("access-{}", username),
                refresh_token: refresh_token.clone(),
                expires_in: 900,
            }),
            None => Err(RpcError::Unauthenticated("unknown refresh token".into())),
        }
    }
}

#[derive(Debug, Default)]
pub struct FakePosts {
    pub script: Script,
    pub seen: Mutex<Vec<SeenCall>>,
}

impl FakePosts {
    pub fn delayed(delay: Duration) -> Self {
        Self {
            script: Script {
                delay: Some(delay),
                ..Script::default()
            },
            ..Self::default()
        }
    }

    pub fn failing(id: u64, err: RpcError) -> Self {
        let mut script = Script::default();
        script.failures.insert(id, err);
        Self {
            script,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<SeenCall> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl PostsApi for FakePosts {
    async fn list_by_author(
        &self,
        ctx: &RequestContext,
        author_id: u64,
        limit: u32,
    ) -> Result<Vec<Post>, RpcError> {
        let mut metadata = MetadataMap::new();
        context_to_metadata(ctx, &mut metadata);
        self.seen.lock().unwrap().push(SeenCall {
            metadata,
            ctx: ctx.clone(),
        });
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.script.failures.get(&author_id) {
            return Err(err.clone());
        }
        Ok((1..=u64::from(limit.min(3)))
            .map(|i| Post {
                id: author_id * 100 + i,
                author_id,
                body: format!("post {}", i),
                created_at: 1_700_000_000 + i,
            })
            .collect())
    }
}

/// Router plus handles on everything behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: MemoryStore,
    pub cache: CacheClient,
    pub users: Arc<FakeUsers>,
    pub posts: Arc<FakePosts>,
    /// Seconds since the epoch as seen by the rate limiter.
    pub clock: Arc<AtomicU64>,
}

impl TestApp {
    pub fn new(config: GatewayConfig, users: FakeUsers, posts: FakePosts) -> Self {
        let store = MemoryStore::new();
        let cache = CacheClient::new(Arc::new(store.clone()), &config.cache);
        let users = Arc::new(users);
        let posts = Arc::new(posts);
        let clock = Arc::new(AtomicU64::new(1_000));

        let config = Arc::new(config);
        let mut state = AppState::new(
            config.clone(),
            KeySet::common(),
            users.clone(),
            posts.clone(),
            cache.clone(),
            Arc::new(Shutdown::new()),
        );
        let ticks = clock.clone();
        state.limiter = RateLimiter::new(cache.clone(), &config.rate_limit)
            .with_clock(Arc::new(move || ticks.load(Ordering::SeqCst)));

        Self {
            router: build_router(state.clone()),
            state,
            store,
            cache,
            users,
            posts,
            clock,
        }
    }

    pub fn standard() -> Self {
        Self::new(config(), FakeUsers::with_users(&[1, 2, 3, 42]), FakePosts::default())
    }
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
