use std::fs::File;
use std::io::BufReader;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::{Deserialize, Deserializer, Serialize};

use crate::common::cluster::SECRET_HEADER;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CHECK_SECS: u64 = 60;
const DEFAULT_CLUSTER_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub allowed_headers: Vec<String>,
    #[serde(default)]
    pub allowed_methods: Vec<String>,
}

/// Connection parameters of the shared metadata store.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct CoreDbConfig {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub s3_endpoint: String,
    #[serde(default)]
    pub s3_region: String,
    #[serde(default)]
    pub s3_key: String,
    #[serde(default)]
    pub s3_secret: String,
    #[serde(default)]
    pub s3_use_ssl: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AuthProvider {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct AnonymousAccess {
    #[serde(default)]
    pub allowed: bool,
    #[serde(default)]
    pub role: String,
}

/// What a worker needs to know about the cluster's auth providers.
/// Token verification itself happens elsewhere.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct AuthSummary {
    #[serde(default)]
    pub providers: Vec<AuthProvider>,
    #[serde(default)]
    pub managed_api_keys: bool,
    #[serde(default)]
    pub anonymous: AnonymousAccess,
    #[serde(default)]
    pub login_url: String,
    #[serde(default)]
    pub redirect_url: String,
}

/// Settings every worker converges on, pushed once at registration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct NodeCommonConfig {
    pub enable_admin_ui: bool,
    pub admin_ui_fetch_path: String,
    pub debug_mode: bool,
    pub cors: CorsConfig,
    pub core_db: CoreDbConfig,
    pub auth: AuthSummary,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ManagementConfig {
    pub bind: String,
    pub secret: String,
    pub cluster_version: String,
    pub timeout_secs: u64,
    pub check_secs: u64,
    pub admin_ui: bool,
    #[serde(default)]
    pub admin_ui_fetch_path: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default, deserialize_with = "comma_list")]
    pub cors_allowed_origins: Vec<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub cors_allowed_headers: Vec<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub cors_allowed_methods: Vec<String>,
    #[serde(default)]
    pub core_db_path: String,
    #[serde(default)]
    pub core_db_readonly: bool,
    #[serde(default)]
    pub core_db_s3_endpoint: String,
    #[serde(default)]
    pub core_db_s3_region: String,
    #[serde(default)]
    pub core_db_s3_key: String,
    #[serde(default)]
    pub core_db_s3_secret: String,
    #[serde(default)]
    pub core_db_s3_use_ssl: bool,
    #[serde(default)]
    pub auth_config_file: Option<String>,
    #[serde(default)]
    pub allowed_anonymous: bool,
    #[serde(default)]
    pub anonymous_role: String,
    #[serde(default)]
    pub allow_managed_api_keys: bool,
}

impl ManagementConfig {
    pub fn timeout(&self) -> Duration {
        secs_or_default(self.timeout_secs, DEFAULT_TIMEOUT_SECS)
    }

    pub fn check_interval(&self) -> Duration {
        secs_or_default(self.check_secs, DEFAULT_CHECK_SECS)
    }

    /// Builds the document pushed to workers, reading the auth file if one is configured.
    pub fn node_common_config(&self) -> Result<NodeCommonConfig> {
        let mut auth = match &self.auth_config_file {
            Some(path) if !path.is_empty() => load_auth_summary(path)?,
            _ => AuthSummary::default(),
        };
        auth.anonymous = AnonymousAccess {
            allowed: self.allowed_anonymous,
            role: self.anonymous_role.clone(),
        };
        if self.allow_managed_api_keys {
            auth.managed_api_keys = true;
        }

        Ok(NodeCommonConfig {
            enable_admin_ui: self.admin_ui,
            admin_ui_fetch_path: self.admin_ui_fetch_path.clone(),
            debug_mode: self.debug,
            cors: CorsConfig {
                allowed_origins: self.cors_allowed_origins.clone(),
                allowed_headers: self.cors_allowed_headers.clone(),
                allowed_methods: self.cors_allowed_methods.clone(),
            },
            core_db: CoreDbConfig {
                path: self.core_db_path.clone(),
                read_only: self.core_db_readonly,
                s3_endpoint: self.core_db_s3_endpoint.clone(),
                s3_region: self.core_db_s3_region.clone(),
                s3_key: self.core_db_s3_key.clone(),
                s3_secret: self.core_db_s3_secret.clone(),
                s3_use_ssl: self.core_db_s3_use_ssl,
            },
            auth,
        })
    }
}

/// Local configuration of a worker, before and after the management node's push.
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default)]
    pub bind: String,
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub node_url: String,
    #[serde(default)]
    pub management_url: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub cluster_timeout_secs: u64,
    #[serde(default = "build_version")]
    pub version: String,
    #[serde(default)]
    pub allow_parallel: bool,
    #[serde(default)]
    pub max_parallel_queries: usize,
    #[serde(default)]
    pub enable_admin_ui: bool,
    #[serde(default)]
    pub admin_ui_fetch_path: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub core_db: CoreDbConfig,
    #[serde(default)]
    pub auth: AuthSummary,
}

impl WorkerConfig {
    pub fn is_cluster_mode(&self) -> bool {
        !self.management_url.is_empty()
    }

    pub fn cluster_timeout(&self) -> Duration {
        secs_or_default(self.cluster_timeout_secs, DEFAULT_CLUSTER_TIMEOUT_SECS)
    }

    /// Merges the pushed document; the management node wins on every shared key.
    pub fn apply_common(&mut self, common: NodeCommonConfig) {
        self.enable_admin_ui = common.enable_admin_ui;
        self.admin_ui_fetch_path = common.admin_ui_fetch_path;
        self.debug = common.debug_mode;
        self.cors = common.cors;
        self.core_db = common.core_db;

        let mut auth = common.auth;
        auth.providers.retain(|p| p.name != SECRET_HEADER);
        auth.providers.insert(
            0,
            AuthProvider {
                kind: "secret".to_string(),
                name: SECRET_HEADER.to_string(),
            },
        );
        self.auth = auth;
    }
}

fn build_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn secs_or_default(secs: u64, default: u64) -> Duration {
    if secs == 0 {
        Duration::from_secs(default)
    } else {
        Duration::from_secs(secs)
    }
}

// Values stay strings until a field asks for a number or a bool.
fn environment() -> Environment {
    Environment::default()
}

/// Accepts either a list or one comma-separated string.
fn comma_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrJoined {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match ListOrJoined::deserialize(deserializer)? {
        ListOrJoined::List(items) => items,
        ListOrJoined::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect(),
    })
}

fn load_env_file(env_file: Option<&str>) {
    let loaded = match env_file {
        Some(path) => dotenv::from_filename(path).map(|_| ()),
        None => dotenv::dotenv().map(|_| ()),
    };
    if let Err(e) = loaded {
        log::debug!("No env file loaded: {}", e);
    }
}

pub fn load_management_config(env_file: Option<&str>) -> Result<ManagementConfig> {
    load_env_file(env_file);
    management_config_from(environment())
}

pub fn management_config_from(env: Environment) -> Result<ManagementConfig> {
    let config: ManagementConfig = Config::builder()
        .set_default("bind", "0.0.0.0:14000")?
        .set_default("cluster_version", build_version())?
        .set_default("timeout_secs", DEFAULT_TIMEOUT_SECS)?
        .set_default("check_secs", DEFAULT_CHECK_SECS)?
        .set_default("admin_ui", true)?
        .set_default("secret", "")?
        .add_source(env)
        .build()?
        .try_deserialize()
        .context("invalid management configuration")?;

    if config.secret.is_empty() {
        anyhow::bail!("SECRET must be set for the management node");
    }
    Ok(config)
}

pub fn load_worker_config(env_file: Option<&str>) -> Result<WorkerConfig> {
    load_env_file(env_file);
    worker_config_from(environment())
}

pub fn worker_config_from(env: Environment) -> Result<WorkerConfig> {
    let config = Config::builder()
        .add_source(env)
        .build()?
        .try_deserialize()
        .context("invalid worker configuration")?;
    Ok(config)
}

pub fn load_auth_summary(path: &str) -> Result<AuthSummary> {
    let file = File::open(path).with_context(|| format!("failed to open auth config {}", path))?;
    let reader = BufReader::new(file);
    let summary = serde_json::from_reader(reader)
        .with_context(|| format!("failed to parse auth config {}", path))?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> Environment {
        let source: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(source))
    }

    #[test]
    fn management_defaults_apply() {
        let config = management_config_from(env_of(&[("SECRET", "s3cr3t")])).unwrap();
        assert_eq!(config.bind, "0.0.0.0:14000");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.check_interval(), Duration::from_secs(60));
        assert_eq!(config.cluster_version, env!("CARGO_PKG_VERSION"));
        assert!(config.admin_ui);
    }

    #[test]
    fn management_requires_secret() {
        assert!(management_config_from(env_of(&[])).is_err());
    }

    #[test]
    fn numeric_looking_strings_are_kept_verbatim() {
        let config = management_config_from(env_of(&[
            ("SECRET", "00123"),
            ("CLUSTER_VERSION", "1.0"),
            ("TIMEOUT_SECS", "12"),
            ("ADMIN_UI", "false"),
        ]))
        .unwrap();
        assert_eq!(config.secret, "00123");
        assert_eq!(config.cluster_version, "1.0");
        assert_eq!(config.timeout(), Duration::from_secs(12));
        assert!(!config.admin_ui);

        let worker = worker_config_from(env_of(&[("SECRET", "007"), ("VERSION", "2.10")])).unwrap();
        assert_eq!(worker.secret, "007");
        assert_eq!(worker.version, "2.10");
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let config = management_config_from(env_of(&[
            ("SECRET", "x"),
            ("TIMEOUT_SECS", "0"),
            ("CHECK_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.check_interval(), Duration::from_secs(5));
    }

    #[test]
    fn common_config_carries_cors_and_auth_flags() {
        let config = management_config_from(env_of(&[
            ("SECRET", "x"),
            ("DEBUG", "true"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example,https://b.example"),
            ("ALLOWED_ANONYMOUS", "true"),
            ("ANONYMOUS_ROLE", "reader"),
            ("CORE_DB_PATH", "s3://meta/core.db"),
        ]))
        .unwrap();
        let common = config.node_common_config().unwrap();
        assert!(common.debug_mode);
        assert_eq!(
            common.cors.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(common.core_db.path, "s3://meta/core.db");
        assert!(common.auth.anonymous.allowed);
        assert_eq!(common.auth.anonymous.role, "reader");
    }

    #[test]
    fn worker_merge_prefers_pushed_values_and_prepends_secret_provider() {
        let mut worker = worker_config_from(env_of(&[
            ("MANAGEMENT_URL", "http://mgmt:14000"),
            ("NODE_NAME", "w1"),
            ("DEBUG", "false"),
        ]))
        .unwrap();
        assert!(worker.is_cluster_mode());
        assert_eq!(worker.cluster_timeout(), Duration::from_secs(5));

        worker.apply_common(NodeCommonConfig {
            debug_mode: true,
            auth: AuthSummary {
                providers: vec![AuthProvider {
                    kind: "jwt".into(),
                    name: "corp".into(),
                }],
                ..Default::default()
            },
            ..Default::default()
        });
        assert!(worker.debug);
        assert_eq!(worker.auth.providers[0].name, SECRET_HEADER);
        assert_eq!(worker.auth.providers[1].name, "corp");
    }
}
