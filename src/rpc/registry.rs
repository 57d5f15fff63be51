//! Downstream client registry.
//!
//! # Responsibilities
//! - Hold one record per logical service (endpoint, channel, state)
//! - Open channels lazily and at most once per record
//! - Probe reachability and track connectivity state
//! - Tear every record down exactly once
//!
//! # Design Decisions
//! - Channels are lazy; reconnection is delegated to the transport
//! - Probe failures never abort startup; they are recorded and retried by the monitor
//! - Records are immutable apart from atomics and the channel slot

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpStream;
use tonic::transport::{Channel, Endpoint};

use crate::config::GatewayConfig;
use crate::health::state::{ConnectivityState, StateTracker, Transition};
use crate::observability::metrics::record_downstream_state;
use crate::resilience::retries::RetryPolicy;
use crate::rpc::clients::RpcClient;
use crate::services::{AddressBook, ServiceName};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no such downstream service: {0}")]
    NoSuchService(String),

    #[error("downstream registry is shut down")]
    ShutDown,

    #[error("invalid endpoint for {service}: {reason}")]
    InvalidEndpoint { service: ServiceName, reason: String },
}

/// Registry tuning.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    pub retry: RetryPolicy,
}

impl RegistryConfig {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            connect_timeout: Duration::from_millis(config.timeouts.connect_ms),
            probe_timeout: Duration::from_millis(config.timeouts.probe_ms),
            healthy_threshold: config.health_check.healthy_threshold,
            unhealthy_threshold: config.health_check.unhealthy_threshold,
            retry: RetryPolicy::new(&config.retries),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// A single downstream service.
#[derive(Debug)]
pub struct DownstreamRecord {
    service: ServiceName,
    address: String,
    endpoint: Endpoint,
    channel: Mutex<Option<Channel>>,
    state: StateTracker,
    open_count: AtomicU32,
    closed: AtomicBool,
    healthy_threshold: u32,
    unhealthy_threshold: u32,
}

impl DownstreamRecord {
    fn new(service: ServiceName, address: &str, config: &RegistryConfig) -> Result<Self, RegistryError> {
        let endpoint = Endpoint::from_shared(address.to_string())
            .map_err(|e| RegistryError::InvalidEndpoint {
                service,
                reason: e.to_string(),
            })?
            .connect_timeout(config.connect_timeout)
            .tcp_nodelay(true);

        Ok(Self {
            service,
            address: address.to_string(),
            endpoint,
            channel: Mutex::new(None),
            state: StateTracker::default(),
            open_count: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            healthy_threshold: config.healthy_threshold,
            unhealthy_threshold: config.unhealthy_threshold,
        })
    }

    pub fn service(&self) -> ServiceName {
        self.service
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> ConnectivityState {
        self.state.get()
    }

    /// Number of channels ever opened for this record (0 or 1 before teardown).
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// The record's channel, opening it on first use.
    pub(crate) fn channel(&self) -> Result<Channel, RegistryError> {
        let mut slot = self
            .channel
            .lock()
            .map_err(|_| RegistryError::ShutDown)?;
        // Checked under the lock so a concurrent teardown cannot race an open.
        if self.is_closed() {
            return Err(RegistryError::ShutDown);
        }
        if let Some(channel) = slot.as_ref() {
            return Ok(channel.clone());
        }

        let channel = self.endpoint.connect_lazy();
        self.open_count.fetch_add(1, Ordering::Relaxed);
        self.apply(self.state.force(ConnectivityState::Connecting));
        tracing::debug!(service = %self.service, address = %self.address, "Downstream channel opened");
        *slot = Some(channel.clone());
        Ok(channel)
    }

    pub(crate) fn mark_success(&self) {
        self.apply(self.state.mark_success(self.healthy_threshold));
    }

    pub(crate) fn mark_failure(&self) {
        self.apply(self.state.mark_failure(self.unhealthy_threshold));
    }

    fn apply(&self, transition: Option<Transition>) {
        let Some(t) = transition else { return };
        match t.to {
            ConnectivityState::TransientFailure => tracing::warn!(
                service = %self.service,
                address = %self.address,
                from = %t.from,
                "Downstream unreachable"
            ),
            _ => tracing::info!(
                service = %self.service,
                from = %t.from,
                to = %t.to,
                "Downstream state changed"
            ),
        }
        record_downstream_state(self.service.as_str(), t.to == ConnectivityState::Ready);
    }

    /// TCP reachability probe bounded by `timeout`. Updates the state.
    pub async fn probe(&self, timeout: Duration) -> bool {
        if self.is_closed() {
            return false;
        }
        let uri = self.endpoint.uri();
        let Some(host) = uri.host() else {
            self.mark_failure();
            return false;
        };
        let port = uri.port_u16().unwrap_or(match uri.scheme_str() {
            Some("https") => 443,
            _ => 80,
        });

        let reachable = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!(service = %self.service, error = %e, "Probe failed: connection error");
                false
            }
            Err(_) => {
                tracing::debug!(service = %self.service, "Probe failed: timeout");
                false
            }
        };

        if reachable {
            self.mark_success();
        } else {
            self.mark_failure();
        }
        reachable
    }

    /// Close the record. Returns true for the call that actually closed it.
    fn close(&self) -> bool {
        let mut slot = match self.channel.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        slot.take();
        self.apply(self.state.force(ConnectivityState::Shutdown));
        true
    }
}

/// Per-record status for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct DownstreamStatus {
    pub service: ServiceName,
    pub address: String,
    pub state: ConnectivityState,
    pub open_count: u32,
}

/// Registry of downstream services keyed by logical name.
#[derive(Debug)]
pub struct DownstreamRegistry {
    records: HashMap<ServiceName, Arc<DownstreamRecord>>,
    config: RegistryConfig,
    torn_down: AtomicBool,
}

impl DownstreamRegistry {
    /// One record per service in `book`. No I/O happens here.
    pub fn new(book: &AddressBook, config: RegistryConfig) -> Result<Self, RegistryError> {
        let records = book
            .iter()
            .map(|(service, address)| {
                DownstreamRecord::new(service, address, &config).map(|r| (service, Arc::new(r)))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            records,
            config,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Open every channel and probe every endpoint once.
    pub async fn start_all(self: &Arc<Self>) -> Result<Teardown, RegistryError> {
        for record in self.records.values() {
            record.channel()?;
        }

        let timeout = self.config.probe_timeout;
        let probes = self.records.values().map(|record| async move {
            let reachable = record.probe(timeout).await;
            (record.service(), reachable)
        });
        for (service, reachable) in join_all(probes).await {
            if !reachable {
                tracing::warn!(
                    service = %service,
                    "Downstream not reachable at startup; continuing"
                );
            }
        }

        tracing::info!(services = self.records.len(), "Downstream clients started");
        Ok(Teardown {
            registry: Arc::clone(self),
        })
    }

    /// A typed-call handle for `service`.
    pub fn get(&self, service: ServiceName) -> Result<RpcClient, RegistryError> {
        if self.is_torn_down() {
            return Err(RegistryError::ShutDown);
        }
        let record = self
            .records
            .get(&service)
            .ok_or_else(|| RegistryError::NoSuchService(service.to_string()))?;
        let channel = record.channel()?;
        Ok(RpcClient::new(
            Arc::clone(record),
            channel,
            self.config.retry.clone(),
        ))
    }

    /// Lookup by textual name.
    pub fn get_by_name(&self, name: &str) -> Result<RpcClient, RegistryError> {
        let service: ServiceName = name
            .parse()
            .map_err(|_| RegistryError::NoSuchService(name.to_string()))?;
        self.get(service)
    }

    pub fn record(&self, service: ServiceName) -> Option<&Arc<DownstreamRecord>> {
        self.records.get(&service)
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<DownstreamRecord>> {
        self.records.values()
    }

    pub fn probe_timeout(&self) -> Duration {
        self.config.probe_timeout
    }

    pub fn snapshot(&self) -> Vec<DownstreamStatus> {
        let mut statuses: Vec<_> = self
            .records
            .values()
            .map(|r| DownstreamStatus {
                service: r.service(),
                address: r.address().to_string(),
                state: r.state(),
                open_count: r.open_count(),
            })
            .collect();
        statuses.sort_by_key(|s| s.service.as_str());
        statuses
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    /// Close every record. Returns false if teardown already ran.
    pub fn teardown(&self) -> bool {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return false;
        }
        let closed = self.records.values().filter(|r| r.close()).count();
        tracing::info!(closed, "Downstream clients torn down");
        true
    }
}

/// Shared teardown handle returned by [`DownstreamRegistry::start_all`].
///
/// Clones share one registry; only the first `run` does any work.
#[derive(Debug, Clone)]
pub struct Teardown {
    registry: Arc<DownstreamRegistry>,
}

impl Teardown {
    pub fn run(&self) -> bool {
        self.registry.teardown()
    }
}
