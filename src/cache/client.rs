//! Typed cache façade used by the rate limiter and the auth verifier.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cache::store::KvStore;
use crate::cache::{CacheError, CacheResult};
use crate::config::CacheConfig;
use crate::context::RequestContext;
use crate::observability::metrics::record_cache_error;

/// Shared handle to the cache store.
///
/// Every operation is bounded by `min(op_timeout, ctx.remaining())`; elapse is a
/// transport failure. After [`CacheClient::close`] every operation fails with
/// `Transport("closed")`.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<RwLock<Option<Arc<dyn KvStore>>>>,
    op_timeout: Duration,
    ping_timeout: Duration,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("op_timeout", &self.op_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self::with_timeouts(
            store,
            Duration::from_millis(config.op_timeout_ms),
            Duration::from_millis(config.ping_timeout_ms),
        )
    }

    pub fn with_timeouts(
        store: Arc<dyn KvStore>,
        op_timeout: Duration,
        ping_timeout: Duration,
    ) -> Self {
        Self {
            store: Arc::new(RwLock::new(Some(store))),
            op_timeout,
            ping_timeout,
        }
    }

    fn store(&self) -> CacheResult<Arc<dyn KvStore>> {
        self.store
            .read()
            .map_err(|_| CacheError::Transport("cache handle poisoned".into()))?
            .clone()
            .ok_or_else(|| CacheError::Transport("closed".into()))
    }

    fn budget(&self, ctx: &RequestContext) -> Duration {
        match ctx.remaining() {
            Some(remaining) => remaining.min(self.op_timeout),
            None => self.op_timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, limit: Duration, fut: F) -> CacheResult<T>
    where
        F: std::future::Future<Output = CacheResult<T>>,
    {
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Transport(format!("{} timed out", op))),
        };
        if let Err(err) = &result {
            if !matches!(err, CacheError::NotFound) {
                record_cache_error(op);
            }
        }
        result
    }

    /// Atomically increment `key`, setting `ttl` iff the key was just created.
    pub async fn incr_ex(&self, ctx: &RequestContext, key: &str, ttl: Duration) -> CacheResult<u64> {
        let store = self.store()?;
        self.bounded("incr_ex", self.budget(ctx), store.incr_ex(key, ttl))
            .await
    }

    pub async fn set_str(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let store = self.store()?;
        self.bounded(
            "set",
            self.budget(ctx),
            store.set(key, value.as_bytes().to_vec(), ttl),
        )
        .await
    }

    /// Fetch a string value; a miss is `CacheError::NotFound`.
    pub async fn get_str(&self, ctx: &RequestContext, key: &str) -> CacheResult<String> {
        let bytes = self.get_bytes(ctx, key).await?;
        String::from_utf8(bytes).map_err(|e| CacheError::Codec(e.to_string()))
    }

    /// Store a JSON-encoded value.
    pub async fn set_obj<T: Serialize>(
        &self,
        ctx: &RequestContext,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let encoded = serde_json::to_vec(value).map_err(|e| CacheError::Codec(e.to_string()))?;
        let store = self.store()?;
        self.bounded("set", self.budget(ctx), store.set(key, encoded, ttl))
            .await
    }

    /// Fetch and decode a JSON value; a miss is `CacheError::NotFound`.
    pub async fn get_obj<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> CacheResult<T> {
        let bytes = self.get_bytes(ctx, key).await?;
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Codec(e.to_string()))
    }

    async fn get_bytes(&self, ctx: &RequestContext, key: &str) -> CacheResult<Vec<u8>> {
        let store = self.store()?;
        self.bounded("get", self.budget(ctx), store.get(key))
            .await?
            .ok_or(CacheError::NotFound)
    }

    /// Delete `key`; deleting a missing key is not an error.
    pub async fn del(&self, ctx: &RequestContext, key: &str) -> CacheResult<()> {
        let store = self.store()?;
        self.bounded("del", self.budget(ctx), store.del(key))
            .await
            .map(|_| ())
    }

    /// Liveness check bounded by the ping timeout.
    pub async fn ping(&self) -> CacheResult<()> {
        let store = self.store()?;
        self.bounded("ping", self.ping_timeout, store.ping()).await
    }

    /// Drop the store handle. Idempotent.
    pub fn close(&self) {
        if let Ok(mut guard) = self.store.write() {
            if guard.take().is_some() {
                tracing::info!("Cache client closed");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store.read().map(|g| g.is_none()).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use async_trait::async_trait;
    use serde::Deserialize;

    fn client() -> CacheClient {
        CacheClient::with_timeouts(
            Arc::new(MemoryStore::new()),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
    }

    struct Stalled;

    #[async_trait]
    impl KvStore for Stalled {
        async fn incr_ex(&self, _: &str, _: Duration) -> CacheResult<u64> {
            std::future::pending().await
        }
        async fn set(&self, _: &str, _: Vec<u8>, _: Option<Duration>) -> CacheResult<()> {
            std::future::pending().await
        }
        async fn get(&self, _: &str) -> CacheResult<Option<Vec<u8>>> {
            std::future::pending().await
        }
        async fn del(&self, _: &str) -> CacheResult<bool> {
            std::future::pending().await
        }
        async fn ping(&self) -> CacheResult<()> {
            std::future::pending().await
        }
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Session {
        user_id: u64,
        device: String,
    }

    #[tokio::test]
    async fn miss_is_not_found() {
        let ctx = RequestContext::default();
        assert_eq!(
            client().get_str(&ctx, "absent").await,
            Err(CacheError::NotFound)
        );
    }

    #[tokio::test]
    async fn structured_values_round_trip_through_json() {
        let cache = client();
        let ctx = RequestContext::default();
        let session = Session {
            user_id: 9,
            device: "phone".into(),
        };
        cache.set_obj(&ctx, "s", &session, None).await.unwrap();
        assert_eq!(cache.get_obj::<Session>(&ctx, "s").await.unwrap(), session);
        assert!(matches!(
            cache.get_obj::<u64>(&ctx, "s").await,
            Err(CacheError::Codec(_))
        ));
    }

    #[tokio::test]
    async fn closed_client_reports_transport_error() {
        let cache = client();
        let ctx = RequestContext::default();
        cache.close();
        cache.close();
        assert!(cache.is_closed());
        assert_eq!(
            cache.ping().await,
            Err(CacheError::Transport("closed".into()))
        );
        assert!(matches!(
            cache.incr_ex(&ctx, "k", Duration::from_secs(1)).await,
            Err(CacheError::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn operations_are_bounded_by_context_deadline() {
        let cache = CacheClient::with_timeouts(
            Arc::new(Stalled),
            Duration::from_secs(30),
            Duration::from_millis(50),
        );
        let ctx = RequestContext::default().child_with_timeout(Duration::from_millis(20));
        let started = tokio::time::Instant::now();
        let result = cache.set_str(&ctx, "k", "v", None).await;
        assert!(matches!(result, Err(CacheError::Transport(_))));
        assert!(started.elapsed() < Duration::from_secs(1));

        assert!(matches!(cache.ping().await, Err(CacheError::Transport(_))));
    }
}
