//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every downstream endpoint
//! - Update record state based on results

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::rpc::DownstreamRegistry;

pub struct HealthMonitor {
    registry: Arc<DownstreamRegistry>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(registry: Arc<DownstreamRegistry>, config: HealthCheckConfig) -> Self {
        Self { registry, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Downstream health checks disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);
        // start_all already probed once.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.registry.is_torn_down() {
                        break;
                    }
                    self.check_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every record once. Returns the number of reachable services.
    pub async fn check_all(&self) -> usize {
        let timeout = self.registry.probe_timeout();
        let probes = self.registry.records().map(|record| record.probe(timeout));
        join_all(probes).await.into_iter().filter(|ok| *ok).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::state::ConnectivityState;
    use crate::rpc::RegistryConfig;
    use crate::services::{AddressBook, ServiceName};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn probes_update_state_and_stop_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut overrides = HashMap::new();
        overrides.insert(
            ServiceName::Users,
            format!("http://{}", listener.local_addr().unwrap()),
        );
        let book = AddressBook::resolve(&overrides).unwrap();
        let registry =
            Arc::new(DownstreamRegistry::new(&book, RegistryConfig::default()).unwrap());

        let monitor = HealthMonitor::new(registry.clone(), HealthCheckConfig::default());
        assert!(monitor.check_all().await >= 1);
        assert_eq!(
            registry.record(ServiceName::Users).unwrap().state(),
            ConnectivityState::Ready
        );

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(monitor.run(rx));
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
