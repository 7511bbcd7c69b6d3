use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::common::cluster::{DataSourceStatus, NodeStatus, StorageInfo};
use crate::common::config::NodeCommonConfig;
use crate::common::error::{ClusterError, NodeFailure};
use crate::common::storage::StorageCredential;
use crate::server::node::{NodeHandle, NodeSettings};
use crate::traits::node_config::NodeConfigSource;

/// Cluster membership of the management node plus the commands fanned out to it.
pub struct Registry {
    settings: NodeSettings,
    node_config: Arc<dyn NodeConfigSource>,
    members: Mutex<IndexMap<String, Arc<NodeHandle>>>,
}

impl Registry {
    pub fn new(settings: NodeSettings, node_config: Arc<dyn NodeConfigSource>) -> Self {
        Self {
            settings,
            node_config,
            members: Mutex::new(IndexMap::new()),
        }
    }

    pub fn cluster_version(&self) -> &str {
        &self.settings.cluster_version
    }

    pub fn secret(&self) -> &str {
        &self.settings.secret
    }

    /// Adds a worker and starts its health loop. A worker already known under
    /// the same URL or the same name is replaced, not toggled off.
    pub async fn register(
        &self,
        name: &str,
        url: &str,
        version: &str,
    ) -> Result<NodeCommonConfig, ClusterError> {
        if url.is_empty() {
            return Err(ClusterError::MissingArgument("url"));
        }
        let name = if name.is_empty() { url } else { name };
        let node = NodeHandle::new(name, url, version, &self.settings)
            .map_err(|e| ClusterError::InvalidParameter(format!("url: {:#}", e)))?;
        let node = Arc::new(node);

        let mut members = self.members.lock().await;
        members.retain(|member, handle| {
            let replaced = member == name || handle.url() == url;
            if replaced {
                handle.stop();
                log::info!("node {} ({}) replaced by new registration", member, handle.url());
            }
            !replaced
        });
        node.start();
        members.insert(name.to_string(), node);
        log::info!("node {} registered with URL {} (version {:?})", name, url, version);

        Ok(self.node_config.node_config())
    }

    pub async fn deregister(&self, name: &str) -> Result<(), ClusterError> {
        let mut members = self.members.lock().await;
        let node = members
            .shift_remove(name)
            .ok_or_else(|| ClusterError::NodeNotFound(name.to_string()))?;
        node.stop();
        log::info!("node {} unregistered", name);
        Ok(())
    }

    pub async fn member(&self, name: &str) -> Option<Arc<NodeHandle>> {
        self.members.lock().await.get(name).cloned()
    }

    pub async fn list_members(&self) -> Vec<NodeStatus> {
        let members = self.members.lock().await;
        members.values().map(|node| node.status()).collect()
    }

    pub async fn shutdown(&self) {
        let mut members = self.members.lock().await;
        for node in members.values() {
            node.stop();
        }
        members.clear();
    }

    pub async fn load_data_source(&self, name: &str) -> Result<(), ClusterError> {
        let source: Arc<str> = Arc::from(name);
        self.broadcast(format!("load data source {}", name), move |node| {
            let source = Arc::clone(&source);
            async move { node.load_data_source(&source).await }
        })
        .await
    }

    pub async fn unload_data_source(&self, name: &str) -> Result<(), ClusterError> {
        let source: Arc<str> = Arc::from(name);
        self.broadcast(format!("unload data source {}", name), move |node| {
            let source = Arc::clone(&source);
            async move { node.unload_data_source(&source).await }
        })
        .await
    }

    /// One entry per member; a failing node reports `status = "error"` instead
    /// of failing the whole query.
    pub async fn data_source_status(&self, name: &str) -> Vec<DataSourceStatus> {
        let source: Arc<str> = Arc::from(name);
        self.fan_out(move |node| {
            let source = Arc::clone(&source);
            async move { node.data_source_status(&source).await }
        })
        .await
        .into_iter()
        .map(|(node, result)| match result {
            Ok(status) => DataSourceStatus {
                node,
                status,
                error: String::new(),
            },
            Err(e) => DataSourceStatus {
                node,
                status: "error".to_string(),
                error: e.to_string(),
            },
        })
        .collect()
    }

    pub async fn register_storage(&self, credential: StorageCredential) -> Result<(), ClusterError> {
        // Reject bad parameter sets once, before any node is contacted.
        credential.to_registration()?;
        let action = format!("register storage {}", credential.name);
        let credential = Arc::new(credential);
        self.broadcast(action, move |node| {
            let credential = Arc::clone(&credential);
            async move { node.register_storage(&credential).await }
        })
        .await
    }

    pub async fn unregister_storage(&self, name: &str) -> Result<(), ClusterError> {
        let storage: Arc<str> = Arc::from(name);
        self.broadcast(format!("unregister storage {}", name), move |node| {
            let storage = Arc::clone(&storage);
            async move { node.unregister_storage(&storage).await }
        })
        .await
    }

    /// Not-ready nodes are skipped; any other node error fails the listing.
    pub async fn registered_storages(&self) -> Result<Vec<StorageInfo>, ClusterError> {
        let mut storages = Vec::new();
        let mut failures = Vec::new();
        for (node, result) in self.fan_out(|node| async move { node.registered_storages().await }).await {
            match result {
                Ok(mut found) => storages.append(&mut found),
                Err(ClusterError::NotReady) => {
                    log::debug!("node {}: not ready, skipped from storage listing", node);
                }
                Err(e) => failures.push(NodeFailure {
                    node,
                    action: "list storages".to_string(),
                    error: e.to_string(),
                }),
            }
        }
        if failures.is_empty() {
            Ok(storages)
        } else {
            Err(ClusterError::Broadcast(failures))
        }
    }

    async fn snapshot(&self) -> Vec<Arc<NodeHandle>> {
        self.members.lock().await.values().cloned().collect()
    }

    async fn broadcast<F, Fut>(&self, action: String, op: F) -> Result<(), ClusterError>
    where
        F: Fn(Arc<NodeHandle>) -> Fut,
        Fut: Future<Output = Result<(), ClusterError>> + Send + 'static,
    {
        let mut failures = Vec::new();
        for (node, result) in self.fan_out(op).await {
            match result {
                Ok(()) => log::info!("node {}: {} succeeded", node, action),
                Err(e) => {
                    log::error!("node {}: failed to {}: {}", node, action, e);
                    failures.push(NodeFailure {
                        node,
                        action: action.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ClusterError::Broadcast(failures))
        }
    }

    /// Runs `op` against every member concurrently and returns each outcome
    /// under its node name, in membership order. The structural lock is only
    /// held while the snapshot is copied. Nodes still running when the
    /// deadline (one call timeout) passes are reported as timed out.
    async fn fan_out<T, F, Fut>(&self, op: F) -> Vec<(String, Result<T, ClusterError>)>
    where
        T: Send + 'static,
        F: Fn(Arc<NodeHandle>) -> Fut,
        Fut: Future<Output = Result<T, ClusterError>> + Send + 'static,
    {
        let members = self.snapshot().await;
        let names: Vec<String> = members.iter().map(|n| n.name().to_string()).collect();
        let mut outcome_slots: Vec<Option<Result<T, ClusterError>>> =
            members.iter().map(|_| None).collect();

        let mut tasks = JoinSet::new();
        for (index, node) in members.into_iter().enumerate() {
            let call = op(node);
            tasks.spawn(async move { (index, call.await) });
        }

        let deadline = self.settings.timeout;
        let collected = tokio::time::timeout(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, outcome)) => outcome_slots[index] = Some(outcome),
                    Err(e) => log::error!("node call aborted: {}", e),
                }
            }
        })
        .await;
        let timed_out = collected.is_err();
        if timed_out {
            log::warn!("broadcast deadline of {:?} elapsed", deadline);
            tasks.abort_all();
        }

        names
            .into_iter()
            .zip(outcome_slots)
            .map(|(name, outcome)| {
                let outcome = outcome.unwrap_or_else(|| {
                    if timed_out {
                        Err(ClusterError::Timeout(deadline))
                    } else {
                        Err(ClusterError::Worker("node call aborted".to_string()))
                    }
                });
                (name, outcome)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> Registry {
        let settings = NodeSettings {
            secret: "secret".into(),
            cluster_version: "1.0.0".into(),
            check_interval: Duration::from_secs(60),
            timeout: Duration::from_millis(200),
        };
        Registry::new(settings, Arc::new(NodeCommonConfig::default()))
    }

    #[tokio::test]
    async fn register_requires_url_and_defaults_name() {
        let registry = registry();
        assert!(matches!(
            registry.register("w1", "", "1.0.0").await.unwrap_err(),
            ClusterError::MissingArgument("url")
        ));

        registry.register("", "http://127.0.0.1:9", "1.0.0").await.unwrap();
        let members = registry.list_members().await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "http://127.0.0.1:9");
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn membership_follows_register_and_deregister() {
        let registry = registry();
        registry.register("a", "http://127.0.0.1:9/a", "1.0.0").await.unwrap();
        registry.register("b", "http://127.0.0.1:9/b", "1.0.0").await.unwrap();
        registry.register("c", "http://127.0.0.1:9/c", "1.0.0").await.unwrap();
        registry.deregister("b").await.unwrap();
        assert!(matches!(
            registry.deregister("b").await.unwrap_err(),
            ClusterError::NodeNotFound(_)
        ));

        let names: Vec<String> = registry
            .list_members()
            .await
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string()]);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn same_url_reregistration_replaces_handle() {
        let registry = registry();
        registry.register("a", "http://127.0.0.1:9/a", "1.0.0").await.unwrap();
        let first = registry.member("a").await.unwrap();

        registry.register("renamed", "http://127.0.0.1:9/a", "1.0.0").await.unwrap();
        assert!(!first.is_running());
        assert!(registry.member("a").await.is_none());
        let second = registry.member("renamed").await.unwrap();
        assert!(second.is_running());
        assert_eq!(registry.list_members().await.len(), 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn broadcast_to_not_ready_node_reports_it() {
        let registry = registry();
        registry.register("old", "http://127.0.0.1:9/old", "0.1.0").await.unwrap();
        let err = registry.load_data_source("sales").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to load data source sales on node old: node is not ready"
        );
        assert!(registry.registered_storages().await.unwrap().is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn empty_cluster_broadcasts_succeed() {
        let registry = registry();
        registry.unload_data_source("sales").await.unwrap();
        assert!(registry.data_source_status("sales").await.is_empty());
    }
}
