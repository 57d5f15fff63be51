//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect the cache, retrying with bounded backoff
//! - Start the downstream registry and the health monitor
//! - Bind listeners and serve until shutdown
//! - Run the ordered shutdown sequence and report how it ended
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal, and whatever was already started
//!   is released before returning
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - Progress is published on a watch channel so tests and the admin surface
//!   can observe it

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::admin::{admin_router, AdminState};
use crate::cache::{CacheClient, CacheError, CacheResult, KvStore, MemoryStore, RedisStore};
use crate::config::{CacheConfig, GatewayConfig};
use crate::context::{KeyError, KeyRegistry};
use crate::health::HealthMonitor;
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::{Shutdown, ShutdownOutcome};
use crate::resilience::backoff::calculate_backoff;
use crate::rpc::{
    DownstreamRegistry, GrpcPosts, GrpcUsers, PostsApi, RegistryConfig, RegistryError, Teardown,
    UsersApi,
};
use crate::services::{AddressBook, AddressError};

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Configuring,
    ConnectingCache,
    StartingClients,
    Listening(SocketAddr),
    Draining,
    Stopped,
}

impl Phase {
    /// Bound address while listening.
    pub fn listening_addr(&self) -> Option<SocketAddr> {
        match self {
            Phase::Listening(addr) => Some(*addr),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Configuring => f.write_str("configuring"),
            Phase::ConnectingCache => f.write_str("connecting_cache"),
            Phase::StartingClients => f.write_str("starting_clients"),
            Phase::Listening(addr) => write!(f, "listening on {}", addr),
            Phase::Draining => f.write_str("draining"),
            Phase::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cache unavailable after {attempts} attempts: {last}")]
    CacheUnavailable { attempts: u32, last: String },

    #[error("invalid service address: {0}")]
    Address(#[from] AddressError),

    #[error("downstream registry: {0}")]
    Registry(#[from] RegistryError),

    #[error("invalid context keys: {0}")]
    Keys(#[from] KeyError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Opens the cache store used by the gateway.
#[async_trait]
pub trait CacheConnector: Send + Sync {
    async fn connect(&self, config: &CacheConfig) -> CacheResult<Arc<dyn KvStore>>;
}

/// Connects to Redis at `cache.address`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl CacheConnector for RedisConnector {
    async fn connect(&self, config: &CacheConfig) -> CacheResult<Arc<dyn KvStore>> {
        let store = RedisStore::connect(&config.url()).await?;
        Ok(Arc::new(store))
    }
}

/// Hands out a shared in-process store.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector(pub MemoryStore);

#[async_trait]
impl CacheConnector for MemoryConnector {
    async fn connect(&self, _config: &CacheConfig) -> CacheResult<Arc<dyn KvStore>> {
        Ok(Arc::new(self.0.clone()))
    }
}

/// Connect and ping the cache, up to `connect_attempts` times.
///
/// Each attempt (connect plus ping) is bounded by `ping_timeout_ms`.
pub async fn connect_cache(
    connector: &dyn CacheConnector,
    config: &CacheConfig,
) -> Result<Arc<dyn KvStore>, StartupError> {
    let attempts = config.connect_attempts.max(1);
    let ping_timeout = Duration::from_millis(config.ping_timeout_ms);
    let mut last = String::new();

    for attempt in 1..=attempts {
        let outcome = tokio::time::timeout(ping_timeout, async {
            let store = connector.connect(config).await?;
            store.ping().await?;
            Ok::<_, CacheError>(store)
        })
        .await;

        match outcome {
            Ok(Ok(store)) => {
                tracing::info!(address = %config.address, attempt, "Cache connected");
                return Ok(store);
            }
            Ok(Err(e)) => last = e.to_string(),
            Err(_) => last = format!("ping timed out after {:?}", ping_timeout),
        }

        tracing::warn!(
            address = %config.address,
            attempt,
            attempts,
            error = %last,
            "Cache connection attempt failed"
        );
        if attempt < attempts {
            tokio::time::sleep(calculate_backoff(
                attempt,
                config.base_delay_ms,
                config.max_delay_ms,
            ))
            .await;
        }
    }

    Err(StartupError::CacheUnavailable { attempts, last })
}

/// Owns the process from configuration to exit.
pub struct Supervisor {
    config: Arc<GatewayConfig>,
    connector: Arc<dyn CacheConnector>,
    apis: Option<(Arc<dyn UsersApi>, Arc<dyn PostsApi>)>,
    metrics: Option<PrometheusHandle>,
    shutdown: Arc<Shutdown>,
    phase: watch::Sender<Phase>,
}

impl Supervisor {
    pub fn new(config: GatewayConfig) -> Self {
        let (phase, _) = watch::channel(Phase::Configuring);
        Self {
            config: Arc::new(config),
            connector: Arc::new(RedisConnector),
            apis: None,
            metrics: None,
            shutdown: Arc::new(Shutdown::new()),
            phase,
        }
    }

    pub fn with_cache_connector(mut self, connector: Arc<dyn CacheConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Serve with these service APIs instead of the gRPC clients.
    pub fn with_apis(mut self, users: Arc<dyn UsersApi>, posts: Arc<dyn PostsApi>) -> Self {
        self.apis = Some((users, posts));
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn shutdown_handle(&self) -> Arc<Shutdown> {
        self.shutdown.clone()
    }

    fn enter(&self, phase: Phase) {
        tracing::info!(phase = %phase, "Lifecycle phase");
        self.phase.send_replace(phase);
    }

    /// Start every subsystem, serve until shutdown, then release everything.
    pub async fn run(self) -> Result<ShutdownOutcome, StartupError> {
        let started = Instant::now();
        self.enter(Phase::Configuring);

        let keys = KeyRegistry::with_extras(self.config.context.extra_keys.iter().cloned())?
            .registered()
            .clone();
        let book = AddressBook::resolve(&self.config.service_overrides())?;

        self.enter(Phase::ConnectingCache);
        let store = connect_cache(self.connector.as_ref(), &self.config.cache).await?;
        let cache = CacheClient::new(store, &self.config.cache);

        self.enter(Phase::StartingClients);
        let registry = match DownstreamRegistry::new(&book, RegistryConfig::from_config(&self.config)) {
            Ok(registry) => Arc::new(registry),
            Err(e) => {
                cache.close();
                return Err(e.into());
            }
        };
        let teardown = match registry.start_all().await {
            Ok(teardown) => teardown,
            Err(e) => {
                registry.teardown();
                cache.close();
                return Err(e.into());
            }
        };
        let monitor = HealthMonitor::new(registry.clone(), self.config.health_check.clone());
        tokio::spawn(monitor.run(self.shutdown.subscribe()));

        let release = |error: StartupError| {
            self.shutdown.trigger();
            teardown.run();
            cache.close();
            error
        };

        let address = self.config.listener.bind_address.clone();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => return Err(release(StartupError::Bind { address, source })),
        };
        let local = match listener.local_addr() {
            Ok(local) => local,
            Err(e) => return Err(release(StartupError::Serve(e))),
        };

        let admin = if self.config.admin.enabled {
            let address = self.config.admin.bind_address.clone();
            let admin_listener = match TcpListener::bind(&address).await {
                Ok(listener) => listener,
                Err(source) => return Err(release(StartupError::Bind { address, source })),
            };
            let router = admin_router(
                AdminState {
                    registry: registry.clone(),
                    phase: self.phase.subscribe(),
                    started,
                    metrics: self.metrics.clone(),
                },
                &self.config.admin.api_key,
            );
            let shutdown = self.shutdown.clone();
            tracing::info!(address = %address, "Admin server listening");
            Some(tokio::spawn(async move {
                axum::serve(admin_listener, router)
                    .with_graceful_shutdown(async move { shutdown.triggered().await })
                    .await
            }))
        } else {
            None
        };

        let (users, posts) = match self.apis.clone() {
            Some(apis) => apis,
            None => (
                Arc::new(GrpcUsers::new(registry.clone())) as Arc<dyn UsersApi>,
                Arc::new(GrpcPosts::new(registry.clone())) as Arc<dyn PostsApi>,
            ),
        };
        let state = AppState::new(
            self.config.clone(),
            keys,
            users,
            posts,
            cache.clone(),
            self.shutdown.clone(),
        );
        let mut serving = tokio::spawn(HttpServer::new(state).run(listener, self.shutdown.clone()));
        self.enter(Phase::Listening(local));

        let exited_early = tokio::select! {
            _ = self.shutdown.triggered() => None,
            result = &mut serving => Some(result),
        };
        self.enter(Phase::Draining);

        let outcome = match exited_early {
            Some(Ok(Ok(()))) => Ok(ShutdownOutcome::Clean),
            Some(Ok(Err(e))) => {
                tracing::error!(error = %e, "HTTP server failed");
                self.shutdown.trigger();
                Err(StartupError::Serve(e))
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "HTTP server task failed");
                self.shutdown.trigger();
                Ok(ShutdownOutcome::Forced)
            }
            None => Ok(self.drain(&mut serving).await),
        };

        self.stop(admin, &teardown, &cache);
        tracing::info!(outcome = ?outcome, uptime_secs = started.elapsed().as_secs(), "Gateway stopped");
        outcome
    }

    /// Release everything started after the listener bound and publish `Stopped`.
    fn stop(&self, admin: Option<JoinHandle<std::io::Result<()>>>, teardown: &Teardown, cache: &CacheClient) {
        if let Some(admin) = admin {
            admin.abort();
        }
        if teardown.run() {
            tracing::info!("Downstream clients closed");
        }
        cache.close();
        self.enter(Phase::Stopped);
    }

    /// Wait for in-flight requests, bounded by the grace window and by a
    /// forced shutdown.
    async fn drain(
        &self,
        serving: &mut JoinHandle<std::io::Result<()>>,
    ) -> ShutdownOutcome {
        let grace = self.config.timeouts.shutdown_grace();
        tokio::select! {
            result = &mut *serving => {
                match result {
                    Ok(Err(e)) => tracing::error!(error = %e, "HTTP server failed while draining"),
                    Err(e) => tracing::error!(error = %e, "HTTP server task failed while draining"),
                    Ok(Ok(())) => {}
                }
                ShutdownOutcome::Clean
            }
            _ = tokio::time::sleep(grace) => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace window elapsed; aborting in-flight requests");
                serving.abort();
                ShutdownOutcome::Forced
            }
            _ = self.shutdown.forced() => {
                tracing::warn!("Shutdown forced; aborting in-flight requests");
                serving.abort();
                ShutdownOutcome::Interrupted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Unreachable(AtomicU32);

    #[async_trait]
    impl CacheConnector for Unreachable {
        async fn connect(&self, _config: &CacheConfig) -> CacheResult<Arc<dyn KvStore>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(CacheError::Transport("connection refused".into()))
        }
    }

    fn cache_config(attempts: u32) -> CacheConfig {
        CacheConfig {
            connect_attempts: attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..CacheConfig::default()
        }
    }

    #[tokio::test]
    async fn cache_connect_gives_up_after_k_attempts() {
        let connector = Unreachable(AtomicU32::new(0));
        let err = connect_cache(&connector, &cache_config(3)).await.err().unwrap();
        assert!(matches!(err, StartupError::CacheUnavailable { attempts: 3, .. }));
        assert_eq!(connector.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn memory_connector_connects_first_time() {
        let connector = MemoryConnector::default();
        assert!(connect_cache(&connector, &cache_config(1)).await.is_ok());
    }

    #[tokio::test]
    async fn stop_releases_everything_and_reports_stopped() {
        let supervisor = Supervisor::new(GatewayConfig::default());
        let phase = supervisor.phase();

        let book = AddressBook::resolve(&Default::default()).unwrap();
        let config = RegistryConfig {
            probe_timeout: Duration::from_millis(20),
            ..RegistryConfig::default()
        };
        let registry = Arc::new(DownstreamRegistry::new(&book, config).unwrap());
        let teardown = registry.start_all().await.unwrap();
        let cache = CacheClient::new(Arc::new(MemoryStore::new()), &CacheConfig::default());
        let (alive, admin_gone) = tokio::sync::oneshot::channel::<()>();
        let admin = tokio::spawn(async move {
            let _alive = alive;
            std::future::pending::<std::io::Result<()>>().await
        });

        supervisor.stop(Some(admin), &teardown, &cache);

        assert_eq!(*phase.borrow(), Phase::Stopped);
        assert!(registry.is_torn_down());
        assert!(cache.is_closed());
        // The admin task dropped its end when it was aborted.
        assert!(admin_gone.await.is_err());
        // A second stop finds nothing left to tear down.
        assert!(!teardown.run());
    }

    #[test]
    fn phase_display() {
        assert_eq!(Phase::ConnectingCache.to_string(), "connecting_cache");
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        assert_eq!(Phase::Listening(addr).listening_addr(), Some(addr));
    }
}
