//! Startup and shutdown behaviour of the supervisor against real sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use social_gateway::cache::{CacheError, CacheResult, KvStore, MemoryStore};
use social_gateway::config::{CacheConfig, GatewayConfig};
use social_gateway::lifecycle::{
    CacheConnector, MemoryConnector, Phase, ShutdownOutcome, StartupError, Supervisor,
};

mod common;
use common::{config, mint_token, FakePosts, FakeUsers};

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn gateway_config() -> GatewayConfig {
    let mut config = config();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.health_check.enabled = false;
    config.timeouts.probe_ms = 50;
    config.timeouts.request_ms = 5_000;
    config.timeouts.shutdown_grace_secs = 5;
    config
}

fn supervisor(config: GatewayConfig, users: FakeUsers) -> Supervisor {
    Supervisor::new(config)
        .with_cache_connector(Arc::new(MemoryConnector(MemoryStore::new())))
        .with_apis(Arc::new(users), Arc::new(FakePosts::default()))
}

async fn wait_listening(phase: &mut watch::Receiver<Phase>) -> SocketAddr {
    let current = tokio::time::timeout(
        Duration::from_secs(10),
        phase.wait_for(|p| p.listening_addr().is_some()),
    )
    .await
    .expect("gateway did not start listening")
    .expect("supervisor dropped");
    current.listening_addr().unwrap()
}

#[tokio::test]
async fn graceful_shutdown_completes_in_flight_request() {
    let users = FakeUsers::with_users(&[1]).delayed(Duration::from_millis(500));
    let supervisor = supervisor(gateway_config(), users);
    let mut phase = supervisor.phase();
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    let addr = wait_listening(&mut phase).await;
    let token = mint_token(1, "sess-1");
    let in_flight = tokio::spawn(
        reqwest::Client::new()
            .get(format!("http://{}/user?id=1", addr))
            .bearer_auth(token)
            .send(),
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(shutdown.trigger());

    let res = in_flight.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["username"], "user1");

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, ShutdownOutcome::Clean);
    assert_eq!(*phase.borrow(), Phase::Stopped);

    // The listener is gone.
    let after = reqwest::Client::new()
        .get(format!("http://{}/health", addr))
        .timeout(Duration::from_secs(1))
        .send()
        .await;
    assert!(after.is_err());
}

#[tokio::test]
async fn grace_window_overrun_is_forced() {
    let mut config = gateway_config();
    config.timeouts.request_ms = 30_000;
    config.timeouts.shutdown_grace_secs = 1;
    let users = FakeUsers::with_users(&[1]).delayed(Duration::from_secs(20));
    let supervisor = supervisor(config, users);
    let mut phase = supervisor.phase();
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    let addr = wait_listening(&mut phase).await;
    let token = mint_token(1, "sess-1");
    let _stuck = tokio::spawn(
        reqwest::Client::new()
            .get(format!("http://{}/user?id=1", addr))
            .bearer_auth(token)
            .send(),
    );
    tokio::time::sleep(Duration::from_millis(150)).await;

    shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert_eq!(outcome.exit_code(), 1);
}

#[tokio::test]
async fn second_signal_interrupts_drain() {
    let mut config = gateway_config();
    config.timeouts.request_ms = 30_000;
    config.timeouts.shutdown_grace_secs = 30;
    let users = FakeUsers::with_users(&[1]).delayed(Duration::from_secs(20));
    let supervisor = supervisor(config, users);
    let mut phase = supervisor.phase();
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());

    let addr = wait_listening(&mut phase).await;
    let token = mint_token(1, "sess-1");
    let _stuck = tokio::spawn(
        reqwest::Client::new()
            .get(format!("http://{}/user?id=1", addr))
            .bearer_auth(token)
            .send(),
    );
    tokio::time::sleep(Duration::from_millis(150)).await;

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.force();

    let outcome = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Interrupted);
    assert_eq!(outcome.exit_code(), 130);
}

struct RefusingCache(AtomicU32);

#[async_trait]
impl CacheConnector for RefusingCache {
    async fn connect(&self, _config: &CacheConfig) -> CacheResult<Arc<dyn KvStore>> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Transport("connection refused".into()))
    }
}

#[tokio::test]
async fn unreachable_cache_aborts_before_binding() {
    let addr = free_addr();
    let mut config = gateway_config();
    config.listener.bind_address = addr.to_string();
    config.cache.connect_attempts = 3;
    config.cache.base_delay_ms = 10;
    config.cache.max_delay_ms = 20;

    let connector = Arc::new(RefusingCache(AtomicU32::new(0)));
    let supervisor = Supervisor::new(config)
        .with_cache_connector(connector.clone())
        .with_apis(
            Arc::new(FakeUsers::default()),
            Arc::new(FakePosts::default()),
        );
    let phase = supervisor.phase();

    let err = supervisor.run().await.unwrap_err();
    assert!(matches!(err, StartupError::CacheUnavailable { attempts: 3, .. }));
    assert_eq!(connector.0.load(Ordering::SeqCst), 3);
    assert_eq!(*phase.borrow(), Phase::ConnectingCache);
    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn admin_surface_requires_api_key() {
    let admin_addr = free_addr();
    let mut config = gateway_config();
    config.admin.enabled = true;
    config.admin.bind_address = admin_addr.to_string();
    config.admin.api_key = "admin-key".to_string();

    let supervisor = supervisor(config, FakeUsers::default());
    let mut phase = supervisor.phase();
    let shutdown = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());
    wait_listening(&mut phase).await;

    let client = reqwest::Client::new();
    let status_url = format!("http://{}/admin/status", admin_addr);

    let res = client.get(&status_url).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(&status_url)
        .bearer_auth("admin-key")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["phase"].as_str().unwrap().starts_with("listening"));

    let res = client
        .get(format!("http://{}/admin/downstreams", admin_addr))
        .bearer_auth("admin-key")
        .send()
        .await
        .unwrap();
    let downstreams: serde_json::Value = res.json().await.unwrap();
    let names: Vec<&str> = downstreams
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["service"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"users"));
    assert!(names.contains(&"posts"));

    shutdown.trigger();
    assert_eq!(run.await.unwrap().unwrap(), ShutdownOutcome::Clean);
}
