use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::common::config::load_management_config;
use crate::rest::{
    data_sources::{data_source_status, load_data_source, unload_data_source},
    nodes::{deregister_node, get_nodes, get_version, register_node},
    storages::{get_storages, register_storage, unregister_storage},
};
use crate::server::auth::require_secret;
use crate::server::node::NodeSettings;
use crate::server::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

/// Management API. Every route sits behind the shared-secret guard.
pub fn router(registry: Arc<Registry>) -> Router {
    let secret: Arc<str> = Arc::from(registry.secret());
    let state = AppState { registry };

    Router::new()
        .route("/version", get(get_version))
        .route(
            "/node",
            post(register_node).delete(deregister_node).get(get_nodes),
        )
        .route("/data-source/:name/status", get(data_source_status))
        .route(
            "/data-source/:name/load",
            get(load_data_source).post(load_data_source),
        )
        .route(
            "/data-source/:name/unload",
            get(unload_data_source).post(unload_data_source),
        )
        .route("/storages", post(register_storage).get(get_storages))
        .route("/storages/:name", delete(unregister_storage))
        .layer(middleware::from_fn_with_state(secret, require_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn management_server_start(env_file: Option<&str>) -> anyhow::Result<()> {
    env_logger::init();
    log::info!("Starting cluster management server...");
    let config = load_management_config(env_file)?;
    let node_config = config.node_common_config()?;

    let registry = Arc::new(Registry::new(
        NodeSettings::from_config(&config),
        Arc::new(node_config),
    ));
    let app = router(Arc::clone(&registry));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log::info!(
        "Management server listening on {} (cluster version {}, timeout {:?}, check interval {:?})",
        config.bind,
        config.cluster_version,
        config.timeout(),
        config.check_interval()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    registry.shutdown().await;
    served.map_err(|e| {
        error!("Failed to run server: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    log::info!("Management server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
