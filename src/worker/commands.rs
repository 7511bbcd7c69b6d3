use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::common::cluster::{OperationResult, PingResponse, SourceStatusResponse, StorageInfo};
use crate::common::error::ClusterError;
use crate::common::storage::StorageRegistration;
use crate::server::auth::require_secret;
use crate::traits::query_engine::QueryEngine;

/// Command API a worker serves to the management node, backed by its engine.
pub fn router<E>(engine: Arc<E>, secret: &str) -> Router
where
    E: QueryEngine + Sync + 'static,
{
    let secret: Arc<str> = Arc::from(secret);
    Router::new()
        .route("/cluster/ping", get(ping::<E>))
        .route("/cluster/data-sources/:name/load", post(load::<E>))
        .route("/cluster/data-sources/:name/unload", post(unload::<E>))
        .route("/cluster/data-sources/:name/status", get(status::<E>))
        .route(
            "/cluster/storages",
            post(register_storage::<E>).get(registered_storages::<E>),
        )
        .route("/cluster/storages/:name", delete(unregister_storage::<E>))
        .layer(middleware::from_fn_with_state(secret, require_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

fn outcome(result: anyhow::Result<()>, done: String) -> Json<OperationResult> {
    match result {
        Ok(()) => Json(OperationResult::ok(done)),
        Err(e) => {
            log::error!("cluster command failed: {:#}", e);
            Json(OperationResult::failed(format!("{:#}", e)))
        }
    }
}

async fn ping<E>(State(engine): State<Arc<E>>) -> Result<Json<PingResponse>, ClusterError>
where
    E: QueryEngine + Sync + 'static,
{
    let version = engine.version().await.map_err(ClusterError::worker)?;
    Ok(Json(PingResponse { version }))
}

async fn load<E>(State(engine): State<Arc<E>>, Path(name): Path<String>) -> Json<OperationResult>
where
    E: QueryEngine + Sync + 'static,
{
    let result = engine.load_data_source(&name).await;
    outcome(result, format!("data source {} loaded", name))
}

async fn unload<E>(State(engine): State<Arc<E>>, Path(name): Path<String>) -> Json<OperationResult>
where
    E: QueryEngine + Sync + 'static,
{
    let result = engine.unload_data_source(&name).await;
    outcome(result, format!("data source {} unloaded", name))
}

async fn status<E>(
    State(engine): State<Arc<E>>,
    Path(name): Path<String>,
) -> Result<Json<SourceStatusResponse>, ClusterError>
where
    E: QueryEngine + Sync + 'static,
{
    let status = engine
        .data_source_status(&name)
        .await
        .map_err(ClusterError::worker)?;
    Ok(Json(SourceStatusResponse { status }))
}

async fn register_storage<E>(
    State(engine): State<Arc<E>>,
    Json(registration): Json<StorageRegistration>,
) -> Json<OperationResult>
where
    E: QueryEngine + Sync + 'static,
{
    let result = engine.register_storage(&registration).await;
    outcome(result, format!("storage {} registered", registration.name))
}

async fn unregister_storage<E>(
    State(engine): State<Arc<E>>,
    Path(name): Path<String>,
) -> Json<OperationResult>
where
    E: QueryEngine + Sync + 'static,
{
    let result = engine.unregister_storage(&name).await;
    outcome(result, format!("storage {} unregistered", name))
}

async fn registered_storages<E>(
    State(engine): State<Arc<E>>,
) -> Result<Json<Vec<StorageInfo>>, ClusterError>
where
    E: QueryEngine + Sync + 'static,
{
    let storages = engine
        .registered_storages()
        .await
        .map_err(ClusterError::worker)?;
    Ok(Json(storages))
}
