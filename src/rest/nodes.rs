use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::common::cluster::{NodeStatus, OperationResult, VersionResponse};
use crate::common::config::NodeCommonConfig;
use crate::common::error::ClusterError;
use crate::server::rest_server::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct DeregisterParams {
    #[serde(default)]
    pub name: String,
}

pub async fn get_version(State(st): State<AppState>) -> Json<VersionResponse> {
    Json(VersionResponse {
        version: st.registry.cluster_version().to_string(),
    })
}

pub async fn register_node(
    State(st): State<AppState>,
    Query(params): Query<RegisterParams>,
) -> Result<Json<NodeCommonConfig>, ClusterError> {
    let config = st
        .registry
        .register(&params.name, &params.url, &params.version)
        .await?;
    Ok(Json(config))
}

pub async fn deregister_node(
    State(st): State<AppState>,
    Query(params): Query<DeregisterParams>,
) -> Result<Json<OperationResult>, ClusterError> {
    if params.name.is_empty() {
        return Err(ClusterError::MissingArgument("name"));
    }
    st.registry.deregister(&params.name).await?;
    Ok(Json(OperationResult::ok(format!(
        "node {} unregistered",
        params.name
    ))))
}

pub async fn get_nodes(State(st): State<AppState>) -> Json<Vec<NodeStatus>> {
    Json(st.registry.list_members().await)
}
