use anyhow::{Context, Result, bail};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};

use crate::common::cluster::{DataSourceStatus, NodeStatus, StorageInfo, VersionResponse};
use crate::common::config::{NodeCommonConfig, WorkerConfig};
use crate::common::storage::StorageCredential;
use crate::server::node_client::{ensure_success, join_segments, secret_client};

/// A worker's link to the management node: the join/leave handshake and the
/// cluster-wide operations the worker exposes to its own users.
#[derive(Clone)]
pub struct ClusterAdapter {
    management: Url,
    http: Client,
    node_name: String,
    node_url: String,
    version: String,
}

impl ClusterAdapter {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        if config.management_url.is_empty() {
            bail!("MANAGEMENT_URL is required in cluster mode");
        }
        if config.secret.is_empty() {
            bail!("SECRET is required in cluster mode");
        }
        let management = Url::parse(&config.management_url)
            .with_context(|| format!("invalid management url {}", config.management_url))?;
        let http = secret_client(&config.secret, config.cluster_timeout())?;
        // The registry files unnamed nodes under their url.
        let node_name = if config.node_name.is_empty() {
            config.node_url.clone()
        } else {
            config.node_name.clone()
        };
        Ok(Self {
            management,
            http,
            node_name,
            node_url: config.node_url.clone(),
            version: config.version.clone(),
        })
    }

    /// Joins the cluster when `MANAGEMENT_URL` is set and merges the pushed
    /// configuration into `config`. Standalone workers get `None`.
    pub async fn connect(config: &mut WorkerConfig) -> Result<Option<Self>> {
        if !config.is_cluster_mode() {
            log::info!("No management url configured, running standalone");
            return Ok(None);
        }
        let adapter = Self::new(config)?;
        let common = adapter.join().await?;
        config.apply_common(common);
        Ok(Some(adapter))
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        join_segments(&self.management, segments)
    }

    /// Registers this worker and returns the configuration the management node pushes.
    pub async fn join(&self) -> Result<NodeCommonConfig> {
        let res = self
            .http
            .post(self.endpoint(&["node"])?)
            .query(&[
                ("name", self.node_name.as_str()),
                ("url", self.node_url.as_str()),
                ("version", self.version.as_str()),
            ])
            .send()
            .await
            .context("failed to register node")?;
        let res = ensure_success(res).await.context("failed to register node")?;

        let is_json = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));
        if !is_json {
            bail!("invalid response format");
        }
        let common: NodeCommonConfig = res.json().await.context("failed to decode response")?;
        log::info!(
            "Joined cluster at {} as {}",
            self.management,
            self.node_name
        );
        Ok(common)
    }

    /// Best effort: a failure is logged and otherwise ignored.
    pub async fn leave(&self) {
        if let Err(e) = self.try_leave().await {
            log::warn!("Failed to unregister node {}: {:#}", self.node_name, e);
        } else {
            log::info!("Node {} left the cluster", self.node_name);
        }
    }

    async fn try_leave(&self) -> Result<()> {
        let res = self
            .http
            .delete(self.endpoint(&["node"])?)
            .query(&[("name", self.node_name.as_str())])
            .send()
            .await?;
        ensure_success(res).await?;
        Ok(())
    }

    /// Empty when the management node cannot be reached.
    pub async fn cluster_version(&self) -> String {
        match self.fetch_version().await {
            Ok(version) => version,
            Err(e) => {
                log::debug!("Cluster version unavailable: {:#}", e);
                String::new()
            }
        }
    }

    async fn fetch_version(&self) -> Result<String> {
        let res = self.http.get(self.endpoint(&["version"])?).send().await?;
        let version: VersionResponse = ensure_success(res).await?.json().await?;
        Ok(version.version)
    }

    pub async fn nodes(&self) -> Result<Vec<NodeStatus>> {
        let res = self.http.get(self.endpoint(&["node"])?).send().await?;
        let nodes = ensure_success(res)
            .await
            .context("load nodes")?
            .json()
            .await?;
        Ok(nodes)
    }

    pub async fn data_source_status(&self, name: &str) -> Result<Vec<DataSourceStatus>> {
        let url = self.endpoint(&["data-source", name, "status"])?;
        let res = self.http.get(url).send().await?;
        let statuses = ensure_success(res)
            .await
            .context("retrieve data source status")?
            .json()
            .await?;
        Ok(statuses)
    }

    pub async fn load_data_source(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["data-source", name, "load"])?;
        let res = self.http.post(url).send().await?;
        ensure_success(res).await.context("load data source")?;
        Ok(())
    }

    pub async fn unload_data_source(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["data-source", name, "unload"])?;
        let res = self.http.post(url).send().await?;
        ensure_success(res).await.context("unload data source")?;
        Ok(())
    }

    pub async fn register_storage(&self, credential: &StorageCredential) -> Result<()> {
        let url = self.endpoint(&["storages"])?;
        let res = self.http.post(url).json(credential).send().await?;
        ensure_success(res).await.context("register storage")?;
        Ok(())
    }

    pub async fn unregister_storage(&self, name: &str) -> Result<()> {
        let url = self.endpoint(&["storages", name])?;
        let res = self.http.delete(url).send().await?;
        ensure_success(res).await.context("unregister storage")?;
        Ok(())
    }

    pub async fn registered_storages(&self) -> Result<Vec<StorageInfo>> {
        let res = self.http.get(self.endpoint(&["storages"])?).send().await?;
        let storages = ensure_success(res)
            .await
            .context("registered storages")?
            .json()
            .await?;
        Ok(storages)
    }
}
