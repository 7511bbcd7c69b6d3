use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::common::error::ClusterError;

const KEY_ID: &str = "KEY_ID";
const SECRET: &str = "SECRET";
const REGION: &str = "REGION";
const ENDPOINT: &str = "ENDPOINT";
const USE_SSL: &str = "USE_SSL";
const URL_STYLE: &str = "URL_STYLE";
const URL_COMPATIBILITY_MODE: &str = "URL_COMPATIBILITY_MODE";
const KMS_KEY_ID: &str = "KMS_KEY_ID";
const ACCOUNT_ID: &str = "ACCOUNT_ID";

const S3_REQUIRED: &[&str] = &[KEY_ID, SECRET, REGION, ENDPOINT, USE_SSL, URL_STYLE];
const R2_REQUIRED: &[&str] = &[KEY_ID, SECRET, REGION, ENDPOINT, USE_SSL, URL_STYLE, ACCOUNT_ID];

/// Object-storage credential as an operator submits it to the management node.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageCredential {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Normalized credential document relayed to every worker.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct StorageRegistration {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub scope: Vec<String>,
    pub key_id: String,
    pub secret: String,
    pub region: String,
    pub endpoint: String,
    pub use_ssl: bool,
    pub url_style: String,
    pub url_compatibility: bool,
    pub kms_key_id: String,
    pub account_id: String,
}

pub fn required_parameters(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "s3" | "gcs" => Some(S3_REQUIRED),
        "r2" => Some(R2_REQUIRED),
        _ => None,
    }
}

impl StorageCredential {
    /// Checks the parameter map against the credential type and builds the
    /// document workers receive. Never touches the network.
    pub fn to_registration(&self) -> Result<StorageRegistration, ClusterError> {
        if self.name.is_empty() {
            return Err(ClusterError::MissingArgument("name"));
        }
        let required = required_parameters(&self.kind)
            .ok_or_else(|| ClusterError::UnsupportedStorageType(self.kind.clone()))?;
        if let Some(missing) = required.iter().find(|k| !self.parameters.contains_key(**k)) {
            return Err(ClusterError::MissingParameter(missing.to_string()));
        }

        Ok(StorageRegistration {
            kind: self.kind.clone(),
            name: self.name.clone(),
            scope: self.scope.clone(),
            key_id: self.string_param(KEY_ID)?,
            secret: self.string_param(SECRET)?,
            region: self.string_param(REGION)?,
            endpoint: self.string_param(ENDPOINT)?,
            use_ssl: self.bool_param(USE_SSL)?,
            url_style: self.string_param(URL_STYLE)?,
            url_compatibility: self.bool_param(URL_COMPATIBILITY_MODE)?,
            kms_key_id: self.string_param(KMS_KEY_ID)?,
            account_id: self.string_param(ACCOUNT_ID)?,
        })
    }

    // Absent optional keys read as "" / false; required ones were checked above.
    fn string_param(&self, key: &str) -> Result<String, ClusterError> {
        match self.parameters.get(key) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(ClusterError::InvalidParameter(key.to_string())),
        }
    }

    fn bool_param(&self, key: &str) -> Result<bool, ClusterError> {
        match self.parameters.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(ClusterError::InvalidParameter(key.to_string())),
        }
    }
}
