use anyhow::Result;

use crate::common::cluster::StorageInfo;
use crate::common::storage::StorageRegistration;

/// Administrative commands a worker's query engine executes on behalf of the cluster.
#[trait_variant::make(QueryEngine: Send)]
pub trait UnsendQueryEngine {
    async fn version(&self) -> Result<String>;
    async fn load_data_source(&self, name: &str) -> Result<()>;
    async fn unload_data_source(&self, name: &str) -> Result<()>;
    async fn data_source_status(&self, name: &str) -> Result<String>;
    async fn register_storage(&self, registration: &StorageRegistration) -> Result<()>;
    async fn unregister_storage(&self, name: &str) -> Result<()>;
    async fn registered_storages(&self) -> Result<Vec<StorageInfo>>;
}
