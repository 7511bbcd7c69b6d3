use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use serde_json::Value;

use crate::common::cluster::OperationResult;
use crate::common::storage::StorageCredential;
use crate::worker::adapter::ClusterAdapter;

/// Cluster operations callable by name from inside the worker's query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterFunction {
    Version,
    Nodes,
    DataSourceStatus,
    LoadDataSource,
    UnloadDataSource,
    RegisterStorage,
    UnregisterStorage,
    RegisteredStorages,
}

impl ClusterFunction {
    pub const ALL: [ClusterFunction; 8] = [
        ClusterFunction::Version,
        ClusterFunction::Nodes,
        ClusterFunction::DataSourceStatus,
        ClusterFunction::LoadDataSource,
        ClusterFunction::UnloadDataSource,
        ClusterFunction::RegisterStorage,
        ClusterFunction::UnregisterStorage,
        ClusterFunction::RegisteredStorages,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ClusterFunction::Version => "core_cluster_version",
            ClusterFunction::Nodes => "core_cluster_nodes",
            ClusterFunction::DataSourceStatus => "core_cluster_data_source_status",
            ClusterFunction::LoadDataSource => "core_cluster_load_data_source",
            ClusterFunction::UnloadDataSource => "core_cluster_unload_data_source",
            ClusterFunction::RegisterStorage => "core_cluster_register_storage",
            ClusterFunction::UnregisterStorage => "core_cluster_unregister_storage",
            ClusterFunction::RegisteredStorages => "core_cluster_registered_storages",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn arity(self) -> usize {
        match self {
            ClusterFunction::Version
            | ClusterFunction::Nodes
            | ClusterFunction::RegisteredStorages => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for ClusterFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime source exposing [`ClusterFunction`]s over a [`ClusterAdapter`].
#[derive(Clone)]
pub struct ClusterSource {
    adapter: Arc<ClusterAdapter>,
}

impl ClusterSource {
    pub fn new(adapter: Arc<ClusterAdapter>) -> Self {
        Self { adapter }
    }

    pub fn name(&self) -> &'static str {
        "core.cluster"
    }

    pub fn functions(&self) -> impl Iterator<Item = &'static str> {
        ClusterFunction::ALL.into_iter().map(ClusterFunction::name)
    }

    /// Calls a function by name. Mutations always answer with an
    /// `OperationResult`; reads surface their errors.
    pub async fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        let function =
            ClusterFunction::from_name(name).ok_or_else(|| anyhow!("unknown function {}", name))?;
        self.invoke(function, args).await
    }

    pub async fn invoke(&self, function: ClusterFunction, args: &[Value]) -> Result<Value> {
        if args.len() != function.arity() {
            bail!(
                "{}: invalid number of arguments, expected {} got {}",
                function,
                function.arity(),
                args.len()
            );
        }
        let value = match function {
            ClusterFunction::Version => Value::String(self.adapter.cluster_version().await),
            ClusterFunction::Nodes => serde_json::to_value(self.adapter.nodes().await?)?,
            ClusterFunction::DataSourceStatus => {
                let name = string_arg(function, &args[0])?;
                serde_json::to_value(self.adapter.data_source_status(name).await?)?
            }
            ClusterFunction::RegisteredStorages => {
                serde_json::to_value(self.adapter.registered_storages().await?)?
            }
            ClusterFunction::LoadDataSource => {
                let name = string_arg(function, &args[0])?;
                let result = self.adapter.load_data_source(name).await;
                operation(result, "data source was loaded")?
            }
            ClusterFunction::UnloadDataSource => {
                let name = string_arg(function, &args[0])?;
                let result = self.adapter.unload_data_source(name).await;
                operation(result, "data source was unloaded")?
            }
            ClusterFunction::RegisterStorage => {
                let credential: StorageCredential = serde_json::from_value(args[0].clone())
                    .map_err(|e| anyhow!("{}: invalid credential: {}", function, e))?;
                let result = self.adapter.register_storage(&credential).await;
                operation(result, "storage registered")?
            }
            ClusterFunction::UnregisterStorage => {
                let name = string_arg(function, &args[0])?;
                let result = self.adapter.unregister_storage(name).await;
                operation(result, "storage unregistered")?
            }
        };
        Ok(value)
    }
}

fn string_arg(function: ClusterFunction, arg: &Value) -> Result<&str> {
    arg.as_str()
        .ok_or_else(|| anyhow!("{}: invalid argument type, expected string", function))
}

fn operation(result: Result<()>, done: &str) -> Result<Value> {
    let result = match result {
        Ok(()) => OperationResult::ok(done),
        Err(e) => OperationResult::failed(format!("{:#}", e)),
    };
    Ok(serde_json::to_value(result)?)
}
