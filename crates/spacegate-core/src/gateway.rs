//! The gateway: collaborator clients, caches and tokens of one instance
//!
//! Operations live in their own modules as further `impl Gateway` blocks.

use crate::cache::{CachedProvider, CachedRegistry, Caches};
use crate::config::GatewayConfig;
use crate::context::CallContext;
use crate::error::{GatewayError, Result};
use crate::token::TokenManager;
use spacegate_services::*;
use std::sync::Arc;

/// Routing and consistency layer in front of the collaborator services
pub struct Gateway {
    pub(crate) config: GatewayConfig,
    pub(crate) pool: Arc<dyn ServicePool>,
    pub(crate) caches: Arc<Caches>,
    pub(crate) tokens: TokenManager,
}

impl Gateway {
    /// Create a gateway dialing its collaborators through `pool`
    pub fn new(config: GatewayConfig, pool: Arc<dyn ServicePool>) -> Self {
        let caches = Arc::new(Caches::new(&config.caches));
        let tokens = TokenManager::new(&config);
        Self {
            config,
            pool,
            caches,
            tokens,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    /// Build the context of a call from a session token
    pub fn context_from_token(&self, token: &str) -> Result<CallContext> {
        let claims = self.tokens.verify_session(token)?;
        Ok(CallContext::new(claims.user, token, claims.scope))
    }

    pub(crate) fn registry(&self, ctx: &CallContext) -> Result<Arc<dyn StorageRegistry>> {
        let inner = self
            .pool
            .storage_registry(&self.config.storage_registry)
            .map_err(GatewayError::service("GetStorageRegistryClient"))?;
        Ok(Arc::new(CachedRegistry::new(
            inner,
            self.caches.clone(),
            ctx.user_key(),
        )))
    }

    pub(crate) fn storage_provider(
        &self,
        ctx: &CallContext,
        address: &str,
    ) -> Result<Arc<dyn StorageProvider>> {
        let inner = self
            .pool
            .storage_provider(address)
            .map_err(GatewayError::service("GetStorageProviderClient"))?;
        Ok(Arc::new(CachedProvider::new(
            inner,
            self.caches.clone(),
            ctx.user_key(),
        )))
    }

    pub(crate) fn share_manager(&self) -> Result<Arc<dyn ShareManager>> {
        self.pool
            .share_manager(&self.config.share_manager)
            .map_err(GatewayError::service("GetUserShareProviderClient"))
    }

    pub(crate) fn public_share_manager(&self) -> Result<Arc<dyn PublicShareManager>> {
        self.pool
            .public_share_manager(&self.config.public_share_manager)
            .map_err(GatewayError::service("GetPublicShareProviderClient"))
    }

    pub(crate) fn ocm_share_manager(&self) -> Result<Arc<dyn OcmShareManager>> {
        self.pool
            .ocm_share_manager(&self.config.ocm_share_manager)
            .map_err(GatewayError::service("GetOCMShareProviderClient"))
    }

    pub(crate) fn mesh_directory(&self) -> Result<Arc<dyn MeshDirectory>> {
        self.pool
            .mesh_directory(&self.config.mesh_directory)
            .map_err(GatewayError::service("GetOCMProviderAuthorizerClient"))
    }

    pub(crate) fn data_transfer(&self) -> Result<Arc<dyn DataTransfer>> {
        self.pool
            .data_transfer(&self.config.data_transfer)
            .map_err(GatewayError::service("GetDataTxClient"))
    }

    pub(crate) fn app_registry(&self) -> Result<Arc<dyn AppRegistry>> {
        self.pool
            .app_registry(&self.config.app_registry)
            .map_err(GatewayError::service("GetAppRegistryClient"))
    }

    /// Invalidate what `ctx` has cached about the resource `id`
    pub(crate) fn invalidate_stat(&self, ctx: &CallContext, id: Option<&ResourceId>) {
        if let Some(id) = id {
            let removed = self.caches.stat.invalidate(ctx.user_key(), id);
            tracing::trace!(resource = %id, removed, "stat cache invalidated");
        }
    }

    /// Invalidate the stat and provider caches for a space root
    pub(crate) fn invalidate_space(&self, ctx: &CallContext, root: &ResourceId) {
        self.invalidate_stat(ctx, Some(root));
        self.caches.providers.invalidate(&root.space_id);
    }
}

