//! Server configuration
//!
//! Layered with the `config` crate: built-in defaults, an optional TOML file,
//! then `SPACEGATE__*` environment variables (`__` separates nested keys, e.g.
//! `SPACEGATE__GATEWAY__COMMIT_SHARE_TO_STORAGE_GRANT=false`).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use spacegate_core::GatewayConfig;
use std::path::Path;
use std::time::Duration;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "SPACEGATE";

/// Login of the in-memory auth provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevAccount {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Collaborators run in-process instead of being dialed over HTTP
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryBackends {
    /// Identity provider of the development accounts
    pub domain: String,
    pub storage_id: String,
    /// Data endpoint the in-memory provider hands out
    pub data_endpoint: String,
    pub accounts: Vec<DevAccount>,
}

impl Default for MemoryBackends {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            storage_id: "storage-users".to_string(),
            data_endpoint: "http://localhost:9100/data".to_string(),
            accounts: vec![DevAccount {
                username: "einstein".to_string(),
                password: "relativity".to_string(),
                groups: vec!["physics".to_string()],
            }],
        }
    }
}

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Reject RPC calls without a session token
    pub auth_enabled: bool,
    /// Rate limit (requests per second per user)
    pub rate_limit_rps: u32,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
    /// Timeout of calls to collaborator services
    pub service_timeout_secs: u64,
    /// Wire in-memory collaborators (development and tests)
    pub memory_backends: bool,
    pub memory: MemoryBackends,
    pub gateway: GatewayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9000,
            auth_enabled: true,
            rate_limit_rps: 100,
            max_body_size: 5 * 1024 * 1024 * 1024, // 5 GB
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
            service_timeout_secs: 30,
            memory_backends: false,
            memory: MemoryBackends::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, overlaid with `file` (if any) and the environment
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);
        if let Some(file) = file {
            builder = builder.add_source(File::from(file));
        }
        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}
