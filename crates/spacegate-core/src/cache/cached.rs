//! Caching decorators around registry and provider clients
//!
//! A decorator is built for each call with the identity of the caller, since
//! cached entries are scoped per user.

use super::{Caches, ProviderCache, SpaceCreationCache, StatCache};
use async_trait::async_trait;
use spacegate_services::*;
use std::sync::Arc;

/// Storage registry client consulting the provider cache
pub struct CachedRegistry {
    inner: Arc<dyn StorageRegistry>,
    caches: Arc<Caches>,
    user: String,
}

impl CachedRegistry {
    pub fn new(inner: Arc<dyn StorageRegistry>, caches: Arc<Caches>, user: impl Into<String>) -> Self {
        Self {
            inner,
            caches,
            user: user.into(),
        }
    }
}

#[async_trait]
impl StorageRegistry for CachedRegistry {
    async fn list_storage_providers(
        &self,
        req: ListStorageProvidersRequest,
    ) -> Result<ListStorageProvidersResponse> {
        let key = ProviderCache::key(&self.user, &req.filters);
        if let Some(key) = &key {
            if let Some(res) = self.caches.providers.pull(key) {
                tracing::trace!(key = %key, "provider cache hit");
                return Ok(res);
            }
        }
        let res = self.inner.list_storage_providers(req).await?;
        if let Some(key) = key {
            self.caches.providers.push(key, &res);
        }
        Ok(res)
    }

    async fn get_storage_providers(
        &self,
        req: GetStorageProvidersRequest,
    ) -> Result<GetStorageProvidersResponse> {
        self.inner.get_storage_providers(req).await
    }
}

/// Storage provider client consulting the stat and personal space caches
pub struct CachedProvider {
    inner: Arc<dyn StorageProvider>,
    caches: Arc<Caches>,
    user: String,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn StorageProvider>, caches: Arc<Caches>, user: impl Into<String>) -> Self {
        Self {
            inner,
            caches,
            user: user.into(),
        }
    }
}

#[async_trait]
impl StorageProvider for CachedProvider {
    async fn stat(&self, req: StatRequest) -> Result<StatResponse> {
        let key = StatCache::key(&self.user, &req.reference, &req.metadata_keys);
        if let Some(key) = &key {
            if let Some(res) = self.caches.stat.pull(key) {
                tracing::trace!(key = %key, "stat cache hit");
                return Ok(res);
            }
        }
        let res = self.inner.stat(req).await?;
        if let Some(key) = key {
            self.caches.stat.push(key, &res);
        }
        Ok(res)
    }

    async fn create_storage_space(
        &self,
        req: CreateStorageSpaceRequest,
    ) -> Result<CreateStorageSpaceResponse> {
        let key = match (&req.space_type, &req.owner) {
            (SpaceType::Personal, Some(owner)) => SpaceCreationCache::key(&owner.id.opaque_id),
            _ => None,
        };
        if let Some(key) = &key {
            if let Some(res) = self.caches.create_personal_space.pull(key) {
                return Ok(res);
            }
        }
        let res = self.inner.create_storage_space(req).await?;
        if let Some(key) = key {
            self.caches.create_personal_space.push(key, &res);
        }
        Ok(res)
    }

    async fn list_container(&self, req: ListContainerRequest) -> Result<ListContainerResponse> {
        self.inner.list_container(req).await
    }

    async fn create_container(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        self.inner.create_container(req).await
    }

    async fn touch_file(&self, req: ReferenceRequest) -> Result<StatusResponse> {
        self.inner.touch_file(req).await
    }

    async fn delete(&self, req: DeleteRequest) -> Result<StatusResponse> {
        self.inner.delete(req).await
    }

    async fn move_resource(&self, req: MoveRequest) -> Result<StatusResponse> {
        self.inner.move_resource(req).await
    }

    async fn set_arbitrary_metadata(
        &self,
        req: SetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        self.inner.set_arbitrary_metadata(req).await
    }

    async fn unset_arbitrary_metadata(
        &self,
        req: UnsetArbitraryMetadataRequest,
    ) -> Result<StatusResponse> {
        self.inner.unset_arbitrary_metadata(req).await
    }

    async fn set_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.inner.set_lock(req).await
    }

    async fn get_lock(&self, req: ReferenceRequest) -> Result<GetLockResponse> {
        self.inner.get_lock(req).await
    }

    async fn refresh_lock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.inner.refresh_lock(req).await
    }

    async fn unlock(&self, req: LockRequest) -> Result<StatusResponse> {
        self.inner.unlock(req).await
    }

    async fn get_path(&self, req: GetPathRequest) -> Result<GetPathResponse> {
        self.inner.get_path(req).await
    }

    async fn get_quota(&self, req: ReferenceRequest) -> Result<GetQuotaResponse> {
        self.inner.get_quota(req).await
    }

    async fn create_reference(&self, req: CreateReferenceRequest) -> Result<StatusResponse> {
        self.inner.create_reference(req).await
    }

    async fn list_storage_spaces(
        &self,
        req: ListStorageSpacesRequest,
    ) -> Result<ListStorageSpacesResponse> {
        self.inner.list_storage_spaces(req).await
    }

    async fn update_storage_space(
        &self,
        req: UpdateStorageSpaceRequest,
    ) -> Result<UpdateStorageSpaceResponse> {
        self.inner.update_storage_space(req).await
    }

    async fn delete_storage_space(&self, req: DeleteStorageSpaceRequest) -> Result<StatusResponse> {
        self.inner.delete_storage_space(req).await
    }

    async fn add_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.inner.add_grant(req).await
    }

    async fn deny_grant(&self, req: DenyGrantRequest) -> Result<StatusResponse> {
        self.inner.deny_grant(req).await
    }

    async fn update_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.inner.update_grant(req).await
    }

    async fn remove_grant(&self, req: GrantRequest) -> Result<StatusResponse> {
        self.inner.remove_grant(req).await
    }

    async fn list_grants(&self, req: ReferenceRequest) -> Result<ListGrantsResponse> {
        self.inner.list_grants(req).await
    }

    async fn initiate_file_upload(
        &self,
        req: InitiateFileUploadRequest,
    ) -> Result<InitiateFileUploadResponse> {
        self.inner.initiate_file_upload(req).await
    }

    async fn initiate_file_download(
        &self,
        req: ReferenceRequest,
    ) -> Result<InitiateFileDownloadResponse> {
        self.inner.initiate_file_download(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CachesConfig;
    use spacegate_services::memory::MemoryStorageProvider;

    fn einstein() -> User {
        User {
            id: UserId::new("idp", "einstein"),
            username: "einstein".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stat_served_from_cache() {
        let backend = Arc::new(MemoryStorageProvider::new("storage-1", "http://data"));
        let caches = Arc::new(Caches::new(&CachesConfig::default()));
        let provider = CachedProvider::new(backend.clone(), caches.clone(), "einstein");
        let space = provider
            .create_storage_space(CreateStorageSpaceRequest {
                owner: Some(einstein()),
                space_type: SpaceType::Personal,
                name: "Albert".into(),
                quota: None,
                space_id: Some("einstein".into()),
            })
            .await
            .unwrap()
            .space
            .unwrap();

        let req = StatRequest {
            reference: Reference::relative(space.root.clone(), "."),
            metadata_keys: vec![],
        };
        provider.stat(req.clone()).await.unwrap();
        provider.stat(req.clone()).await.unwrap();
        assert_eq!(backend.stat_count(), 1);

        caches.stat.invalidate("einstein", &space.root);
        provider.stat(req).await.unwrap();
        assert_eq!(backend.stat_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_resources_are_not_cached() {
        let backend = Arc::new(MemoryStorageProvider::new("storage-1", "http://data"));
        let caches = Arc::new(Caches::new(&CachesConfig::default()));
        let provider = CachedProvider::new(backend.clone(), caches, "einstein");
        let req = StatRequest {
            reference: Reference::from_id(ResourceId::new("storage-1", "nope", "nope")),
            metadata_keys: vec![],
        };
        for _ in 0..2 {
            let res = provider.stat(req.clone()).await.unwrap();
            assert_eq!(res.status.code, Code::NotFound);
        }
        assert_eq!(backend.stat_count(), 2);
    }

    #[tokio::test]
    async fn test_personal_space_creation_cached() {
        let backend = Arc::new(MemoryStorageProvider::new("storage-1", "http://data"));
        let caches = Arc::new(Caches::new(&CachesConfig::default()));
        let provider = CachedProvider::new(backend.clone(), caches, "einstein");
        let req = CreateStorageSpaceRequest {
            owner: Some(einstein()),
            space_type: SpaceType::Personal,
            name: "Albert".into(),
            quota: None,
            space_id: Some("einstein".into()),
        };
        let first = provider.create_storage_space(req.clone()).await.unwrap();
        let second = provider.create_storage_space(req).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.spaces().len(), 1);
    }
}
