//! Typed downstream clients.
//!
//! `RpcClient` is the raw unary-call handle handed out by the registry. The
//! `UsersApi` / `PostsApi` traits are what the HTTP handlers depend on, so
//! handlers can run against in-process fakes.

use std::sync::Arc;

use async_trait::async_trait;
use http::uri::PathAndQuery;
use tonic::codec::ProstCodec;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::Channel;

use crate::context::RequestContext;
use crate::health::passive::{observe, Observation};
use crate::observability::metrics::record_downstream_call;
use crate::resilience::retries::{Idempotency, RetryPolicy};
use crate::rpc::error::RpcError;
use crate::rpc::metadata::ClientContextInterceptor;
use crate::rpc::proto::{self, GetUserRequest, ListPostsRequest, LoginRequest, Post, RefreshRequest, TokenReply, User};
use crate::rpc::registry::{DownstreamRecord, DownstreamRegistry, RegistryError};
use crate::services::ServiceName;

type Transport = tonic::client::Grpc<InterceptedService<Channel, ClientContextInterceptor>>;

impl From<RegistryError> for RpcError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::ShutDown => RpcError::Unavailable(err.to_string()),
            RegistryError::NoSuchService(_) | RegistryError::InvalidEndpoint { .. } => {
                RpcError::Internal(err.to_string())
            }
        }
    }
}

/// Unary-call handle for one downstream service.
#[derive(Debug, Clone)]
pub struct RpcClient {
    record: Arc<DownstreamRecord>,
    grpc: Transport,
    retry: RetryPolicy,
}

impl RpcClient {
    pub(crate) fn new(record: Arc<DownstreamRecord>, channel: Channel, retry: RetryPolicy) -> Self {
        Self {
            record,
            grpc: tonic::client::Grpc::new(InterceptedService::new(
                channel,
                ClientContextInterceptor,
            )),
            retry,
        }
    }

    pub fn service(&self) -> ServiceName {
        self.record.service()
    }

    /// Issue a unary call on `path`, carrying `ctx` as metadata and its
    /// remaining time as the call deadline.
    pub async fn unary<Req, Resp>(
        &self,
        ctx: &RequestContext,
        path: &'static str,
        idempotency: Idempotency,
        message: Req,
    ) -> Result<Resp, RpcError>
    where
        Req: prost::Message + Clone + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let result = self
            .retry
            .run(ctx, idempotency, || self.call_once(ctx, path, message.clone()))
            .await;

        match observe(&result) {
            Observation::Reachable => self.record.mark_success(),
            Observation::Unreachable => self.record.mark_failure(),
            Observation::Unknown => {}
        }
        let method = path.rsplit('/').next().unwrap_or(path);
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.outcome(),
        };
        record_downstream_call(self.service().as_str(), method, outcome);
        result
    }

    async fn call_once<Req, Resp>(
        &self,
        ctx: &RequestContext,
        path: &'static str,
        message: Req,
    ) -> Result<Resp, RpcError>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        if ctx.is_cancelled() {
            return Err(RpcError::Cancelled);
        }
        if ctx.is_expired() {
            return Err(RpcError::DeadlineExceeded("deadline elapsed before call".into()));
        }

        let mut grpc = self.grpc.clone();
        let mut request = tonic::Request::new(message);
        request.extensions_mut().insert(ctx.clone());
        if let Some(remaining) = ctx.remaining() {
            request.set_timeout(remaining);
        }

        let call = async {
            grpc.ready()
                .await
                .map_err(|e| RpcError::Unavailable(e.to_string()))?;
            let codec: ProstCodec<Req, Resp> = ProstCodec::default();
            grpc.unary(request, PathAndQuery::from_static(path), codec)
                .await
                .map(tonic::Response::into_inner)
                .map_err(RpcError::from)
        };

        tokio::select! {
            biased;
            _ = ctx.done() => Err(if ctx.is_cancelled() {
                RpcError::Cancelled
            } else {
                RpcError::DeadlineExceeded(format!("{} timed out", path))
            }),
            result = call => match result {
                // The transport reports its own timer expiring as a cancellation.
                Err(RpcError::Cancelled) if ctx.is_expired() => {
                    Err(RpcError::DeadlineExceeded(format!("{} timed out", path)))
                }
                other => other,
            },
        }
    }
}

/// Users service operations used by the gateway.
#[async_trait]
pub trait UsersApi: Send + Sync {
    async fn get_user(&self, ctx: &RequestContext, id: u64) -> Result<User, RpcError>;

    async fn login(
        &self,
        ctx: &RequestContext,
        username: String,
        password: String,
    ) -> Result<TokenReply, RpcError>;

    async fn refresh(&self, ctx: &RequestContext, refresh_token: String)
        -> Result<TokenReply, RpcError>;
}

/// Posts service operations used by the gateway.
#[async_trait]
pub trait PostsApi: Send + Sync {
    async fn list_by_author(
        &self,
        ctx: &RequestContext,
        author_id: u64,
        limit: u32,
    ) -> Result<Vec<Post>, RpcError>;
}

/// gRPC-backed [`UsersApi`].
#[derive(Debug, Clone)]
pub struct GrpcUsers {
    registry: Arc<DownstreamRegistry>,
}

impl GrpcUsers {
    pub fn new(registry: Arc<DownstreamRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl UsersApi for GrpcUsers {
    async fn get_user(&self, ctx: &RequestContext, id: u64) -> Result<User, RpcError> {
        let client = self.registry.get(ServiceName::Users)?;
        client
            .unary(ctx, proto::users::GET_USER, Idempotency::Idempotent, GetUserRequest { id })
            .await
    }

    async fn login(
        &self,
        ctx: &RequestContext,
        username: String,
        password: String,
    ) -> Result<TokenReply, RpcError> {
        let client = self.registry.get(ServiceName::Users)?;
        client
            .unary(
                ctx,
                proto::users::LOGIN,
                Idempotency::NonIdempotent,
                LoginRequest { username, password },
            )
            .await
    }

    async fn refresh(
        &self,
        ctx: &RequestContext,
        refresh_token: String,
    ) -> Result<TokenReply, RpcError> {
        let client = self.registry.get(ServiceName::Users)?;
        client
            .unary(
                ctx,
                proto::users::REFRESH,
                Idempotency::NonIdempotent,
                RefreshRequest { refresh_token },
            )
            .await
    }
}

/// gRPC-backed [`PostsApi`].
#[derive(Debug, Clone)]
pub struct GrpcPosts {
    registry: Arc<DownstreamRegistry>,
}

impl GrpcPosts {
    pub fn new(registry: Arc<DownstreamRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl PostsApi for GrpcPosts {
    async fn list_by_author(
        &self,
        ctx: &RequestContext,
        author_id: u64,
        limit: u32,
    ) -> Result<Vec<Post>, RpcError> {
        let client = self.registry.get(ServiceName::Posts)?;
        let reply: proto::ListPostsReply = client
            .unary(
                ctx,
                proto::posts::LIST_BY_AUTHOR,
                Idempotency::Idempotent,
                ListPostsRequest { author_id, limit },
            )
            .await?;
        Ok(reply.posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::registry::RegistryConfig;
    use crate::services::AddressBook;
    use std::collections::HashMap;
    use std::time::Duration;

    fn registry() -> Arc<DownstreamRegistry> {
        let mut overrides = HashMap::new();
        // Nothing listens on port 1.
        overrides.insert(ServiceName::Users, "http://127.0.0.1:1".to_string());
        let book = AddressBook::resolve(&overrides).unwrap();
        Arc::new(DownstreamRegistry::new(&book, RegistryConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn unreachable_downstream_is_unavailable() {
        let users = GrpcUsers::new(registry());
        let ctx = RequestContext::default().child_with_timeout(Duration::from_secs(2));
        let err = users.get_user(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, RpcError::Unavailable(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn expired_context_short_circuits() {
        let users = GrpcUsers::new(registry());
        let ctx = RequestContext::default().child_with_timeout(Duration::ZERO);
        let err = users.get_user(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, RpcError::DeadlineExceeded(_)));
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits() {
        let users = GrpcUsers::new(registry());
        let ctx = RequestContext::default();
        ctx.cancel();
        assert_eq!(users.get_user(&ctx, 1).await.unwrap_err(), RpcError::Cancelled);
    }

    #[tokio::test]
    async fn outgoing_calls_carry_context_metadata() {
        use crate::context::ContextKey;
        use axum::http::HeaderMap;
        use axum::routing::post;
        use std::sync::Mutex;

        let seen: Arc<Mutex<Option<HeaderMap>>> = Arc::default();
        let capture = seen.clone();
        let users_service = axum::Router::new().route(
            proto::users::GET_USER,
            post(move |headers: HeaderMap| async move {
                *capture.lock().unwrap() = Some(headers);
                (
                    [
                        ("content-type", "application/grpc"),
                        ("grpc-status", "5"),
                        ("grpc-message", "no such user"),
                    ],
                    (),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, users_service).await });

        let mut overrides = HashMap::new();
        overrides.insert(ServiceName::Users, format!("http://{}", addr));
        let book = AddressBook::resolve(&overrides).unwrap();
        let registry = Arc::new(DownstreamRegistry::new(&book, RegistryConfig::default()).unwrap());
        let users = GrpcUsers::new(registry);

        let mut ctx = RequestContext::default().child_with_timeout(Duration::from_secs(5));
        ctx.insert(&ContextKey::REQUEST_ID, "req-grpc");
        ctx.insert(&ContextKey::TRACE_ID, "trace-grpc");
        ctx.insert(&ContextKey::USER_ID, "42");

        let err = users.get_user(&ctx, 7).await.unwrap_err();
        assert!(matches!(err, RpcError::NotFound(_)), "got {err:?}");

        let headers = seen
            .lock()
            .unwrap()
            .clone()
            .expect("users service never saw the call");
        assert_eq!(headers["x-request-id"], "req-grpc");
        assert_eq!(headers["x-trace-id"], "trace-grpc");
        assert_eq!(headers["x-user-id"], "42");
        assert!(headers.contains_key("grpc-timeout"));
    }

    #[tokio::test]
    async fn torn_down_registry_reports_unavailable() {
        let registry = registry();
        registry.teardown();
        let users = GrpcUsers::new(registry);
        let ctx = RequestContext::default();
        assert!(matches!(
            users.login(&ctx, "a".into(), "b".into()).await,
            Err(RpcError::Unavailable(_))
        ));
    }
}
