use std::fmt;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// One node's share of a failed broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node: String,
    pub action: String,
    pub error: String,
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to {} on node {}: {}", self.action, self.node, self.error)
    }
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("node is not ready")]
    NotReady,

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("{0} is required")]
    MissingArgument(&'static str),

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported storage type: {0}")]
    UnsupportedStorageType(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Error reported by a worker, or the transport failure reaching it.
    #[error("{0}")]
    Worker(String),

    #[error("{}", join_failures(.0))]
    Broadcast(Vec<NodeFailure>),
}

fn join_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(";\n")
}

impl ClusterError {
    pub fn worker(err: anyhow::Error) -> Self {
        ClusterError::Worker(format!("{:#}", err))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ClusterError::Unauthorized => StatusCode::FORBIDDEN,
            ClusterError::NodeNotFound(_) => StatusCode::NOT_FOUND,
            ClusterError::MissingArgument(_)
            | ClusterError::MissingParameter(_)
            | ClusterError::InvalidParameter(_)
            | ClusterError::UnsupportedStorageType(_) => StatusCode::BAD_REQUEST,
            ClusterError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ClusterError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ClusterError::Worker(_) | ClusterError::Broadcast(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ClusterError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
