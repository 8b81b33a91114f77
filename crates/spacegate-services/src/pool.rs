//! Address-to-client factories
//!
//! The gateway never keeps long-lived clients keyed by configuration. Each call
//! asks the pool for the client serving an address and drops it afterwards.

use crate::{
    AppProvider, AppRegistry, AuthProvider, AuthRegistry, DataTransfer, MeshDirectory,
    OcmShareManager, PublicShareManager, RemoteGateway, Result, ServiceError, ShareManager,
    StorageProvider, StorageRegistry, TransportOptions,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Produces a client implementing a collaborator contract for an address
pub trait ServicePool: Send + Sync {
    fn storage_registry(&self, address: &str) -> Result<Arc<dyn StorageRegistry>>;

    fn storage_provider(&self, address: &str) -> Result<Arc<dyn StorageProvider>>;

    fn auth_registry(&self, address: &str) -> Result<Arc<dyn AuthRegistry>>;

    fn auth_provider(&self, address: &str) -> Result<Arc<dyn AuthProvider>>;

    fn share_manager(&self, address: &str) -> Result<Arc<dyn ShareManager>>;

    fn public_share_manager(&self, address: &str) -> Result<Arc<dyn PublicShareManager>>;

    fn ocm_share_manager(&self, address: &str) -> Result<Arc<dyn OcmShareManager>>;

    fn mesh_directory(&self, address: &str) -> Result<Arc<dyn MeshDirectory>>;

    fn data_transfer(&self, address: &str) -> Result<Arc<dyn DataTransfer>>;

    fn app_registry(&self, address: &str) -> Result<Arc<dyn AppRegistry>>;

    fn app_provider(&self, address: &str) -> Result<Arc<dyn AppProvider>>;

    /// Dial the gateway of another organisation
    fn remote_gateway(
        &self,
        endpoint: &str,
        options: TransportOptions,
    ) -> Result<Arc<dyn RemoteGateway>>;
}

fn lookup<T: ?Sized>(
    services: &DashMap<String, Arc<T>>,
    kind: &'static str,
    address: &str,
) -> Result<Arc<T>> {
    services
        .get(address)
        .map(|entry| Arc::clone(entry.value()))
        .ok_or_else(|| ServiceError::UnknownAddress {
            kind,
            address: address.to_string(),
        })
}

/// Pool of in-process services registered under fake addresses
#[derive(Default)]
pub struct MemoryPool {
    storage_registries: DashMap<String, Arc<dyn StorageRegistry>>,
    storage_providers: DashMap<String, Arc<dyn StorageProvider>>,
    auth_registries: DashMap<String, Arc<dyn AuthRegistry>>,
    auth_providers: DashMap<String, Arc<dyn AuthProvider>>,
    share_managers: DashMap<String, Arc<dyn ShareManager>>,
    public_share_managers: DashMap<String, Arc<dyn PublicShareManager>>,
    ocm_share_managers: DashMap<String, Arc<dyn OcmShareManager>>,
    mesh_directories: DashMap<String, Arc<dyn MeshDirectory>>,
    data_transfers: DashMap<String, Arc<dyn DataTransfer>>,
    app_registries: DashMap<String, Arc<dyn AppRegistry>>,
    app_providers: DashMap<String, Arc<dyn AppProvider>>,
    remote_gateways: DashMap<String, Arc<dyn RemoteGateway>>,
    dials: Mutex<Vec<(String, TransportOptions)>>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_storage_registry(
        &self,
        address: impl Into<String>,
        service: Arc<dyn StorageRegistry>,
    ) {
        self.storage_registries.insert(address.into(), service);
    }

    pub fn register_storage_provider(
        &self,
        address: impl Into<String>,
        service: Arc<dyn StorageProvider>,
    ) {
        self.storage_providers.insert(address.into(), service);
    }

    pub fn register_auth_registry(&self, address: impl Into<String>, service: Arc<dyn AuthRegistry>) {
        self.auth_registries.insert(address.into(), service);
    }

    pub fn register_auth_provider(&self, address: impl Into<String>, service: Arc<dyn AuthProvider>) {
        self.auth_providers.insert(address.into(), service);
    }

    pub fn register_share_manager(&self, address: impl Into<String>, service: Arc<dyn ShareManager>) {
        self.share_managers.insert(address.into(), service);
    }

    pub fn register_public_share_manager(
        &self,
        address: impl Into<String>,
        service: Arc<dyn PublicShareManager>,
    ) {
        self.public_share_managers.insert(address.into(), service);
    }

    pub fn register_ocm_share_manager(
        &self,
        address: impl Into<String>,
        service: Arc<dyn OcmShareManager>,
    ) {
        self.ocm_share_managers.insert(address.into(), service);
    }

    pub fn register_mesh_directory(&self, address: impl Into<String>, service: Arc<dyn MeshDirectory>) {
        self.mesh_directories.insert(address.into(), service);
    }

    pub fn register_data_transfer(&self, address: impl Into<String>, service: Arc<dyn DataTransfer>) {
        self.data_transfers.insert(address.into(), service);
    }

    pub fn register_app_registry(&self, address: impl Into<String>, service: Arc<dyn AppRegistry>) {
        self.app_registries.insert(address.into(), service);
    }

    pub fn register_app_provider(&self, address: impl Into<String>, service: Arc<dyn AppProvider>) {
        self.app_providers.insert(address.into(), service);
    }

    /// Register the gateway reachable at a remote endpoint url
    pub fn register_remote_gateway(
        &self,
        endpoint: impl Into<String>,
        service: Arc<dyn RemoteGateway>,
    ) {
        self.remote_gateways.insert(endpoint.into(), service);
    }

    /// Endpoints dialed so far, with the transport options used
    pub fn remote_dials(&self) -> Vec<(String, TransportOptions)> {
        self.dials.lock().clone()
    }
}

impl ServicePool for MemoryPool {
    fn storage_registry(&self, address: &str) -> Result<Arc<dyn StorageRegistry>> {
        lookup(&self.storage_registries, "storage registry", address)
    }

    fn storage_provider(&self, address: &str) -> Result<Arc<dyn StorageProvider>> {
        lookup(&self.storage_providers, "storage provider", address)
    }

    fn auth_registry(&self, address: &str) -> Result<Arc<dyn AuthRegistry>> {
        lookup(&self.auth_registries, "auth registry", address)
    }

    fn auth_provider(&self, address: &str) -> Result<Arc<dyn AuthProvider>> {
        lookup(&self.auth_providers, "auth provider", address)
    }

    fn share_manager(&self, address: &str) -> Result<Arc<dyn ShareManager>> {
        lookup(&self.share_managers, "share manager", address)
    }

    fn public_share_manager(&self, address: &str) -> Result<Arc<dyn PublicShareManager>> {
        lookup(&self.public_share_managers, "public share manager", address)
    }

    fn ocm_share_manager(&self, address: &str) -> Result<Arc<dyn OcmShareManager>> {
        lookup(&self.ocm_share_managers, "ocm share manager", address)
    }

    fn mesh_directory(&self, address: &str) -> Result<Arc<dyn MeshDirectory>> {
        lookup(&self.mesh_directories, "mesh directory", address)
    }

    fn data_transfer(&self, address: &str) -> Result<Arc<dyn DataTransfer>> {
        lookup(&self.data_transfers, "data transfer", address)
    }

    fn app_registry(&self, address: &str) -> Result<Arc<dyn AppRegistry>> {
        lookup(&self.app_registries, "app registry", address)
    }

    fn app_provider(&self, address: &str) -> Result<Arc<dyn AppProvider>> {
        lookup(&self.app_providers, "app provider", address)
    }

    fn remote_gateway(
        &self,
        endpoint: &str,
        options: TransportOptions,
    ) -> Result<Arc<dyn RemoteGateway>> {
        self.dials.lock().push((endpoint.to_string(), options));
        lookup(&self.remote_gateways, "remote gateway", endpoint)
    }
}
