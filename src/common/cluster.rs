use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying the shared cluster secret on every request, both directions.
pub const SECRET_HEADER: &str = "x-cluster-secret";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NodeStatus {
    pub name: String,
    pub url: String,
    pub version: String,
    pub error: String,
    pub last_seen: DateTime<Utc>,
    pub ready: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DataSourceStatus {
    pub node: String,
    pub status: String,
    #[serde(default)]
    pub error: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageInfo {
    #[serde(default)]
    pub node: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Vec<String>,
    /// Serialized parameter map as the worker's engine reports it.
    #[serde(default)]
    pub parameters: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PingResponse {
    pub version: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceStatusResponse {
    pub status: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VersionResponse {
    pub version: String,
}
