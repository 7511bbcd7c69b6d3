use axum::{
    Json,
    extract::{Path, State},
};

use crate::common::cluster::{OperationResult, StorageInfo};
use crate::common::error::ClusterError;
use crate::common::storage::StorageCredential;
use crate::server::rest_server::AppState;

pub async fn register_storage(
    State(st): State<AppState>,
    Json(credential): Json<StorageCredential>,
) -> Result<Json<OperationResult>, ClusterError> {
    let name = credential.name.clone();
    st.registry.register_storage(credential).await?;
    Ok(Json(OperationResult::ok(format!("storage {} registered", name))))
}

pub async fn unregister_storage(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<OperationResult>, ClusterError> {
    st.registry.unregister_storage(&name).await?;
    Ok(Json(OperationResult::ok(format!("storage {} unregistered", name))))
}

pub async fn get_storages(
    State(st): State<AppState>,
) -> Result<Json<Vec<StorageInfo>>, ClusterError> {
    Ok(Json(st.registry.registered_storages().await?))
}
