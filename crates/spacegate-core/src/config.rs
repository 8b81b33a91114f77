//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a cache keeps its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStore {
    #[default]
    Memory,
    /// Never store anything
    Noop,
}

/// Store, lifetime and size of one cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub store: CacheStore,
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// A cache that never stores
    pub fn noop() -> Self {
        Self {
            store: CacheStore::Noop,
            ..Self::default()
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store: CacheStore::Memory,
            ttl_secs: 300,
            capacity: 1_000_000,
        }
    }
}

/// Settings of the four gateway caches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachesConfig {
    pub stat: CacheConfig,
    pub provider: CacheConfig,
    pub create_home: CacheConfig,
    pub create_personal_space: CacheConfig,
}

impl Default for CachesConfig {
    fn default() -> Self {
        Self {
            stat: CacheConfig::default(),
            provider: CacheConfig::default(),
            create_home: CacheConfig {
                ttl_secs: 86400,
                ..CacheConfig::default()
            },
            create_personal_space: CacheConfig {
                ttl_secs: 86400,
                ..CacheConfig::default()
            },
        }
    }
}

impl CachesConfig {
    /// Every cache disabled
    pub fn noop() -> Self {
        Self {
            stat: CacheConfig::noop(),
            provider: CacheConfig::noop(),
            create_home: CacheConfig::noop(),
            create_personal_space: CacheConfig::noop(),
        }
    }
}

/// Gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Storage registry address
    pub storage_registry: String,
    /// Auth registry address
    pub auth_registry: String,
    /// User share manager address
    pub share_manager: String,
    /// Link share manager address
    pub public_share_manager: String,
    /// Federated share manager address
    pub ocm_share_manager: String,
    /// Mesh directory address
    pub mesh_directory: String,
    /// Data transfer service address
    pub data_transfer: String,
    /// App registry address
    pub app_registry: String,

    /// Mirror every share as a grant on the storage provider
    pub commit_share_to_storage_grant: bool,
    pub disable_home_creation_on_login: bool,
    /// Strip group memberships from the user carried in session tokens
    pub skip_user_groups_in_token: bool,
    /// Folder in the home holding accepted federated shares
    pub share_folder: String,
    /// Folder in the home receiving federated transfers
    pub data_transfers_folder: String,

    pub transfer_shared_secret: String,
    pub transfer_expires_secs: i64,
    /// Externally reachable data gateway url
    pub data_gateway_endpoint: String,

    /// Secret signing session tokens
    pub token_secret: String,
    pub token_expires_secs: i64,

    pub caches: CachesConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            storage_registry: "localhost:19000".to_string(),
            auth_registry: "localhost:19001".to_string(),
            share_manager: "localhost:19002".to_string(),
            public_share_manager: "localhost:19003".to_string(),
            ocm_share_manager: "localhost:19004".to_string(),
            mesh_directory: "localhost:19005".to_string(),
            data_transfer: "localhost:19006".to_string(),
            app_registry: "localhost:19007".to_string(),
            commit_share_to_storage_grant: true,
            disable_home_creation_on_login: false,
            skip_user_groups_in_token: false,
            share_folder: "Shares".to_string(),
            data_transfers_folder: "DataTransfers".to_string(),
            transfer_shared_secret: "change-me-transfer-secret".to_string(),
            transfer_expires_secs: 6000,
            data_gateway_endpoint: "http://localhost:9000/data".to_string(),
            token_secret: "change-me-token-secret".to_string(),
            token_expires_secs: 86400,
            caches: CachesConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Default lifetime of transfer tokens
    pub fn transfer_expires(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.transfer_expires_secs)
    }

    pub fn token_expires(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_expires_secs)
    }
}
