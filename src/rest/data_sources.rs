use axum::{
    Json,
    extract::{Path, State},
};

use crate::common::cluster::{DataSourceStatus, OperationResult};
use crate::common::error::ClusterError;
use crate::server::rest_server::AppState;

pub async fn load_data_source(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<OperationResult>, ClusterError> {
    st.registry.load_data_source(&name).await?;
    Ok(Json(OperationResult::ok(format!("data source {} loaded", name))))
}

pub async fn unload_data_source(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<OperationResult>, ClusterError> {
    st.registry.unload_data_source(&name).await?;
    Ok(Json(OperationResult::ok(format!("data source {} unloaded", name))))
}

pub async fn data_source_status(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> Json<Vec<DataSourceStatus>> {
    Json(st.registry.data_source_status(&name).await)
}
