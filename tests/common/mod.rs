#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use parking_lot::Mutex;

use query_cluster::common::cluster::StorageInfo;
use query_cluster::common::config::NodeCommonConfig;
use query_cluster::common::storage::StorageRegistration;
use query_cluster::server::node::NodeSettings;
use query_cluster::server::registry::Registry;
use query_cluster::server::rest_server;
use query_cluster::traits::query_engine::QueryEngine;
use query_cluster::worker::commands;

pub const SECRET: &str = "test-secret";
pub const VERSION: &str = "1.0.0";

/// Engine double with call counters and switches for failures and latency.
pub struct TestEngine {
    pub version: Mutex<String>,
    pub ping_fails: AtomicBool,
    pub fail_commands: AtomicBool,
    pub delay: Mutex<Duration>,
    pub pings: AtomicUsize,
    pub calls: AtomicUsize,
    pub loaded: Mutex<Vec<String>>,
    pub storages: Mutex<Vec<StorageRegistration>>,
}

impl TestEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            version: Mutex::new(VERSION.to_string()),
            ping_fails: AtomicBool::new(false),
            fail_commands: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            pings: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            loaded: Mutex::new(Vec::new()),
            storages: Mutex::new(Vec::new()),
        })
    }

    pub fn with_storage(name: &str) -> Arc<Self> {
        let engine = Self::new();
        engine.storages.lock().push(StorageRegistration {
            kind: "s3".into(),
            name: name.into(),
            scope: vec![format!("s3://{}", name)],
            key_id: "key".into(),
            secret: "secret".into(),
            region: "eu-west-1".into(),
            endpoint: "s3.example".into(),
            use_ssl: true,
            url_style: "path".into(),
            url_compatibility: false,
            kms_key_id: String::new(),
            account_id: String::new(),
        });
        engine
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn command(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_commands.load(Ordering::SeqCst) {
            bail!("engine refused the command");
        }
        Ok(())
    }
}

impl QueryEngine for TestEngine {
    async fn version(&self) -> Result<String> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        if self.ping_fails.load(Ordering::SeqCst) {
            bail!("engine is shutting down");
        }
        Ok(self.version.lock().clone())
    }

    async fn load_data_source(&self, name: &str) -> Result<()> {
        self.command().await?;
        self.loaded.lock().push(name.to_string());
        Ok(())
    }

    async fn unload_data_source(&self, name: &str) -> Result<()> {
        self.command().await?;
        self.loaded.lock().retain(|n| n != name);
        Ok(())
    }

    async fn data_source_status(&self, name: &str) -> Result<String> {
        self.command().await?;
        let loaded = self.loaded.lock().iter().any(|n| n == name);
        Ok(if loaded { "attached" } else { "detached" }.to_string())
    }

    async fn register_storage(&self, registration: &StorageRegistration) -> Result<()> {
        self.command().await?;
        self.storages.lock().push(registration.clone());
        Ok(())
    }

    async fn unregister_storage(&self, name: &str) -> Result<()> {
        self.command().await?;
        self.storages.lock().retain(|s| s.name != name);
        Ok(())
    }

    async fn registered_storages(&self) -> Result<Vec<StorageInfo>> {
        self.command().await?;
        Ok(self
            .storages
            .lock()
            .iter()
            .map(|s| StorageInfo {
                node: String::new(),
                name: s.name.clone(),
                kind: s.kind.clone(),
                scope: s.scope.clone(),
                parameters: format!("{{\"region\":\"{}\"}}", s.region),
            })
            .collect())
    }
}

async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Serves the worker command API for `engine` on a loopback port.
pub async fn spawn_worker(engine: Arc<TestEngine>) -> String {
    serve(commands::router(engine, SECRET)).await
}

pub async fn spawn_management(registry: Arc<Registry>) -> String {
    serve(rest_server::router(registry)).await
}

pub fn settings(timeout: Duration, check_interval: Duration) -> NodeSettings {
    NodeSettings {
        secret: SECRET.to_string(),
        cluster_version: VERSION.to_string(),
        check_interval,
        timeout,
    }
}

pub fn registry(timeout: Duration, check_interval: Duration) -> Arc<Registry> {
    let common = NodeCommonConfig {
        debug_mode: true,
        admin_ui_fetch_path: "/admin/fetch".into(),
        ..Default::default()
    };
    Arc::new(Registry::new(
        settings(timeout, check_interval),
        Arc::new(common),
    ))
}

/// Polls `check` every 10ms until it holds or `within` elapses.
pub async fn eventually<F: Fn() -> bool>(within: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
