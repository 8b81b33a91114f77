//! Application state

use crate::config::{MemoryBackends, ServerConfig};
use spacegate_core::Gateway;
use spacegate_services::memory::*;
use spacegate_services::{HttpPool, MemoryPool, ServicePool, TokenScope, User, UserId};
use std::sync::Arc;
use tracing::{info, warn};

const MEMORY_PROVIDER_ADDRESS: &str = "memory://storage-provider";
const MEMORY_AUTH_PROVIDER_ADDRESS: &str = "memory://auth-provider";

/// Application state shared across handlers
pub struct AppState {
    pub config: ServerConfig,
    pub gateway: Gateway,
    /// Client forwarding data gateway transfers; only connecting is bounded
    pub data_client: reqwest::Client,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let pool: Arc<dyn ServicePool> = if config.memory_backends {
            warn!("Using in-memory collaborators (data will not persist)");
            Arc::new(memory_pool(&config))
        } else {
            info!(
                storage_registry = %config.gateway.storage_registry,
                share_manager = %config.gateway.share_manager,
                "Dialing collaborators over HTTP"
            );
            Arc::new(HttpPool::new(config.service_timeout())?)
        };
        Self::with_pool(config, pool)
    }

    /// State over an already wired service pool
    pub fn with_pool(config: ServerConfig, pool: Arc<dyn ServicePool>) -> anyhow::Result<Self> {
        // a total timeout would cut off long transfers mid-body
        let data_client = reqwest::Client::builder()
            .connect_timeout(config.service_timeout())
            .build()?;
        let gateway = Gateway::new(config.gateway.clone(), pool);
        Ok(Self {
            config,
            gateway,
            data_client,
        })
    }
}

/// Every collaborator in-process, registered under the configured addresses
fn memory_pool(config: &ServerConfig) -> MemoryPool {
    let gateway = &config.gateway;
    let backends: &MemoryBackends = &config.memory;
    let pool = MemoryPool::new();

    let provider = Arc::new(MemoryStorageProvider::new(
        backends.storage_id.clone(),
        backends.data_endpoint.clone(),
    ));
    let registry = MemoryStorageRegistry::new();
    registry.register(MEMORY_PROVIDER_ADDRESS, provider.clone());
    pool.register_storage_registry(gateway.storage_registry.clone(), Arc::new(registry));
    pool.register_storage_provider(MEMORY_PROVIDER_ADDRESS, provider);

    let auth_registry = MemoryAuthRegistry::new();
    auth_registry.register("basic", MEMORY_AUTH_PROVIDER_ADDRESS);
    let auth = MemoryAuthProvider::new();
    for account in &backends.accounts {
        let user = User {
            id: UserId::new(backends.domain.clone(), account.username.clone()),
            username: account.username.clone(),
            display_name: account.username.clone(),
            mail: format!("{}@{}", account.username, backends.domain),
            groups: account.groups.clone(),
        };
        auth.add_account(
            account.username.clone(),
            account.password.clone(),
            user,
            TokenScope::owner(),
        );
    }
    pool.register_auth_registry(gateway.auth_registry.clone(), Arc::new(auth_registry));
    pool.register_auth_provider(MEMORY_AUTH_PROVIDER_ADDRESS, Arc::new(auth));

    pool.register_share_manager(gateway.share_manager.clone(), Arc::new(MemoryShareManager::new()));
    pool.register_public_share_manager(
        gateway.public_share_manager.clone(),
        Arc::new(MemoryPublicShareManager::new()),
    );
    pool.register_ocm_share_manager(
        gateway.ocm_share_manager.clone(),
        Arc::new(MemoryOcmShareManager::new()),
    );
    pool.register_mesh_directory(gateway.mesh_directory.clone(), Arc::new(MemoryMeshDirectory::new()));
    pool.register_data_transfer(gateway.data_transfer.clone(), Arc::new(MemoryDataTransfer::new()));
    pool.register_app_registry(gateway.app_registry.clone(), Arc::new(MemoryAppRegistry::new()));

    pool
}
