use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::common::cluster::{NodeStatus, StorageInfo};
use crate::common::config::ManagementConfig;
use crate::common::error::ClusterError;
use crate::common::storage::StorageCredential;
use crate::server::node_client::NodeClient;

#[derive(Debug, Clone)]
pub struct NodeSettings {
    pub secret: String,
    pub cluster_version: String,
    pub check_interval: Duration,
    pub timeout: Duration,
}

impl NodeSettings {
    pub fn from_config(config: &ManagementConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            cluster_version: config.cluster_version.clone(),
            check_interval: config.check_interval(),
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone)]
struct NodeHealth {
    last_seen: DateTime<Utc>,
    version: String,
    error: Option<String>,
}

/// A registered worker: identity, last known health, and the loop keeping it fresh.
pub struct NodeHandle {
    name: String,
    url: String,
    cluster_version: String,
    check_interval: Duration,
    timeout: Duration,
    client: NodeClient,
    health: RwLock<NodeHealth>,
    loop_token: Mutex<Option<CancellationToken>>,
}

impl NodeHandle {
    pub fn new(name: &str, url: &str, version: &str, settings: &NodeSettings) -> Result<Self> {
        let client = NodeClient::new(url, &settings.secret, settings.timeout)?;
        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
            cluster_version: settings.cluster_version.clone(),
            check_interval: settings.check_interval,
            timeout: settings.timeout,
            client,
            health: RwLock::new(NodeHealth {
                last_seen: Utc::now(),
                version: version.to_string(),
                error: None,
            }),
            loop_token: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn version(&self) -> String {
        self.health.read().version.clone()
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.health.read().last_seen
    }

    pub fn last_error(&self) -> Option<String> {
        self.health.read().error.clone()
    }

    pub fn is_ready(&self) -> bool {
        let health = self.health.read();
        health.error.is_none() && health.version == self.cluster_version
    }

    pub fn is_running(&self) -> bool {
        self.loop_token
            .lock()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn status(&self) -> NodeStatus {
        let health = self.health.read();
        NodeStatus {
            name: self.name.clone(),
            url: self.url.clone(),
            version: health.version.clone(),
            error: health.error.clone().unwrap_or_default(),
            last_seen: health.last_seen,
            ready: health.error.is_none() && health.version == self.cluster_version,
        }
    }

    /// Starts the health loop. A running loop is cancelled first and the new
    /// one waits one call timeout so the two never overlap.
    pub fn start(self: &Arc<Self>) {
        let token = CancellationToken::new();
        let previous = self.loop_token.lock().replace(token.clone());
        let restarting = match previous {
            Some(previous) => {
                previous.cancel();
                true
            }
            None => false,
        };

        let node = Arc::clone(self);
        tokio::spawn(async move {
            if restarting {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(node.timeout) => {}
                }
            }
            node.health_loop(token).await;
        });
    }

    pub fn stop(&self) {
        if let Some(token) = self.loop_token.lock().take() {
            token.cancel();
        }
    }

    async fn health_loop(&self, token: CancellationToken) {
        log::debug!("node {}: health loop started ({:?})", self.name, self.check_interval);
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.check_interval, self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // The ping is outside the select: cancelling stops the next tick,
            // not the call already in flight.
            let result = self.bounded(self.client.ping()).await;
            self.record_ping(result);
        }
        log::debug!("node {}: health loop stopped", self.name);
    }

    pub(crate) fn record_ping(&self, result: Result<String, ClusterError>) {
        let mut health = self.health.write();
        match result {
            Ok(version) => {
                if health.error.is_some() {
                    log::info!("node {}: reachable again (version {})", self.name, version);
                }
                health.error = None;
                health.version = version;
                health.last_seen = Utc::now();
            }
            Err(e) => {
                if health.error.is_none() {
                    log::warn!("node {}: health check failed: {}", self.name, e);
                }
                health.error = Some(e.to_string());
            }
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, ClusterError>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(ClusterError::worker),
            Err(_) => Err(ClusterError::Timeout(self.timeout)),
        }
    }

    fn ensure_ready(&self) -> Result<(), ClusterError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ClusterError::NotReady)
        }
    }

    pub async fn load_data_source(&self, name: &str) -> Result<(), ClusterError> {
        self.ensure_ready()?;
        self.bounded(self.client.load_data_source(name)).await
    }

    pub async fn unload_data_source(&self, name: &str) -> Result<(), ClusterError> {
        self.ensure_ready()?;
        self.bounded(self.client.unload_data_source(name)).await
    }

    pub async fn data_source_status(&self, name: &str) -> Result<String, ClusterError> {
        self.ensure_ready()?;
        self.bounded(self.client.data_source_status(name)).await
    }

    pub async fn register_storage(&self, credential: &StorageCredential) -> Result<(), ClusterError> {
        self.ensure_ready()?;
        let registration = credential.to_registration()?;
        self.bounded(self.client.register_storage(&registration)).await
    }

    pub async fn unregister_storage(&self, name: &str) -> Result<(), ClusterError> {
        self.ensure_ready()?;
        self.bounded(self.client.unregister_storage(name)).await
    }

    pub async fn registered_storages(&self) -> Result<Vec<StorageInfo>, ClusterError> {
        self.ensure_ready()?;
        let mut storages = self.bounded(self.client.registered_storages()).await?;
        for storage in storages.iter_mut() {
            storage.node = self.name.clone();
        }
        Ok(storages)
    }
}
