//! # Spacegate Services
//!
//! RPC contracts of the collaborators the spacegate gateway orchestrates.
//!
//! This crate provides:
//! - **Schema**: status codes, entities and request/response messages
//! - **Contracts**: one async trait per collaborator service
//! - **Pool**: address-to-client factories ([`ServicePool`])
//! - **Memory**: in-process implementations of every collaborator
//! - **HTTP**: JSON-over-HTTP clients for remote collaborators
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                  Gateway                    │
//! ├─────────────────────────────────────────────┤
//! │                ServicePool                  │
//! ├──────────┬──────────┬──────────┬────────────┤
//! │ Registry │ Provider │  Shares  │ Mesh / ... │
//! ├──────────┴──────────┴──────────┴────────────┤
//! │      memory::*       │     http::HttpService│
//! └──────────────────────┴──────────────────────┘
//! ```

pub mod error;
pub mod http;
pub mod memory;
pub mod messages;
pub mod pool;
pub mod status;
pub mod types;

pub use error::{Result, ServiceError};
pub use http::{HttpPool, HttpService};
pub use messages::*;
pub use pool::{MemoryPool, ServicePool};
pub use status::{Code, Status, WithStatus};
pub use types::*;

use async_trait::async_trait;

/// Resolves references to the providers that serve them
#[async_trait]
pub trait StorageRegistry: Send + Sync {
    /// Providers matching a free-form filter map
    async fn list_storage_providers(
        &self,
        req: ListStorageProvidersRequest,
    ) -> Result<ListStorageProvidersResponse>;

    /// Providers able to host a new space
    async fn get_storage_providers(
        &self,
        req: GetStorageProvidersRequest,
    ) -> Result<GetStorageProvidersResponse>;
}

/// A storage backend; every reference is relative to one of its spaces
#[async_trait]
pub trait StorageProvider: Send + Sync {
    async fn stat(&self, req: StatRequest) -> Result<StatResponse>;

    async fn list_container(&self, req: ListContainerRequest) -> Result<ListContainerResponse>;

    async fn create_container(&self, req: ReferenceRequest) -> Result<StatusResponse>;

    async fn touch_file(&self, req: ReferenceRequest) -> Result<StatusResponse>;

    async fn delete(&self, req: DeleteRequest) -> Result<StatusResponse>;

    async fn move_resource(&self, req: MoveRequest) -> Result<StatusResponse>;

    async fn set_arbitrary_metadata(
        &self,
        req: SetArbitraryMetadataRequest,
    ) -> Result<StatusResponse>;

    async fn unset_arbitrary_metadata(
        &self,
        req: UnsetArbitraryMetadataRequest,
    ) -> Result<StatusResponse>;

    async fn set_lock(&self, req: LockRequest) -> Result<StatusResponse>;

    async fn get_lock(&self, req: ReferenceRequest) -> Result<GetLockResponse>;

    async fn refresh_lock(&self, req: LockRequest) -> Result<StatusResponse>;

    async fn unlock(&self, req: LockRequest) -> Result<StatusResponse>;

    async fn get_path(&self, req: GetPathRequest) -> Result<GetPathResponse>;

    async fn get_quota(&self, req: ReferenceRequest) -> Result<GetQuotaResponse>;

    async fn create_reference(&self, req: CreateReferenceRequest) -> Result<StatusResponse>;

    async fn create_storage_space(
        &self,
        req: CreateStorageSpaceRequest,
    ) -> Result<CreateStorageSpaceResponse>;

    async fn list_storage_spaces(
        &self,
        req: ListStorageSpacesRequest,
    ) -> Result<ListStorageSpacesResponse>;

    async fn update_storage_space(
        &self,
        req: UpdateStorageSpaceRequest,
    ) -> Result<UpdateStorageSpaceResponse>;

    async fn delete_storage_space(&self, req: DeleteStorageSpaceRequest) -> Result<StatusResponse>;

    async fn add_grant(&self, req: GrantRequest) -> Result<StatusResponse>;

    async fn deny_grant(&self, req: DenyGrantRequest) -> Result<StatusResponse>;

    async fn update_grant(&self, req: GrantRequest) -> Result<StatusResponse>;

    async fn remove_grant(&self, req: GrantRequest) -> Result<StatusResponse>;

    async fn list_grants(&self, req: ReferenceRequest) -> Result<ListGrantsResponse>;

    async fn initiate_file_upload(
        &self,
        req: InitiateFileUploadRequest,
    ) -> Result<InitiateFileUploadResponse>;

    async fn initiate_file_download(
        &self,
        req: ReferenceRequest,
    ) -> Result<InitiateFileDownloadResponse>;
}

/// Maps an authentication type to provider addresses
#[async_trait]
pub trait AuthRegistry: Send + Sync {
    async fn get_auth_providers(&self, req: GetAuthProvidersRequest)
        -> Result<GetAuthProvidersResponse>;
}

/// Verifies credentials of one authentication type
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(
        &self,
        req: ProviderAuthenticateRequest,
    ) -> Result<ProviderAuthenticateResponse>;
}

/// Ledger of user and group shares
#[async_trait]
pub trait ShareManager: Send + Sync {
    async fn create_share(&self, req: CreateShareRequest) -> Result<ShareResponse>;

    async fn get_share(&self, req: ShareReferenceRequest) -> Result<ShareResponse>;

    async fn remove_share(&self, req: ShareReferenceRequest) -> Result<StatusResponse>;

    async fn update_share(&self, req: UpdateShareRequest) -> Result<ShareResponse>;

    async fn list_shares(&self, req: ListSharesRequest) -> Result<ListSharesResponse>;

    async fn list_received_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedSharesResponse>;

    async fn get_received_share(&self, req: GetReceivedShareRequest)
        -> Result<ReceivedShareResponse>;

    async fn update_received_share(
        &self,
        req: UpdateReceivedShareRequest,
    ) -> Result<ReceivedShareResponse>;
}

/// Ledger of link shares
#[async_trait]
pub trait PublicShareManager: Send + Sync {
    async fn create_public_share(&self, req: CreatePublicShareRequest)
        -> Result<PublicShareResponse>;

    async fn get_public_share(&self, req: IdRequest) -> Result<PublicShareResponse>;

    async fn list_public_shares(&self, req: ListSharesRequest) -> Result<ListPublicSharesResponse>;

    async fn remove_public_share(&self, req: IdRequest) -> Result<StatusResponse>;
}

/// Ledger of federated shares
#[async_trait]
pub trait OcmShareManager: Send + Sync {
    async fn create_ocm_share(&self, req: CreateOcmShareRequest) -> Result<OcmShareResponse>;

    async fn get_ocm_share(&self, req: IdRequest) -> Result<OcmShareResponse>;

    async fn remove_ocm_share(&self, req: IdRequest) -> Result<StatusResponse>;

    async fn list_ocm_shares(&self, req: ListSharesRequest) -> Result<ListOcmSharesResponse>;

    async fn list_received_ocm_shares(
        &self,
        req: ListReceivedSharesRequest,
    ) -> Result<ListReceivedOcmSharesResponse>;

    async fn get_received_ocm_share(
        &self,
        req: GetReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse>;

    async fn update_received_ocm_share(
        &self,
        req: UpdateReceivedOcmShareRequest,
    ) -> Result<ReceivedOcmShareResponse>;
}

/// Directory of federated organisations and their service endpoints
#[async_trait]
pub trait MeshDirectory: Send + Sync {
    async fn get_info_by_domain(&self, req: GetInfoByDomainRequest)
        -> Result<GetInfoByDomainResponse>;
}

/// Asynchronous data movement between organisations
#[async_trait]
pub trait DataTransfer: Send + Sync {
    async fn create_transfer(&self, req: CreateTransferRequest) -> Result<CreateTransferResponse>;
}

/// Finds app providers for a resource
#[async_trait]
pub trait AppRegistry: Send + Sync {
    async fn get_app_providers(&self, req: GetAppProvidersRequest)
        -> Result<GetAppProvidersResponse>;

    async fn get_default_app_provider(
        &self,
        req: GetDefaultAppProviderRequest,
    ) -> Result<GetDefaultAppProviderResponse>;
}

/// Opens resources in an application
#[async_trait]
pub trait AppProvider: Send + Sync {
    async fn open_in_app(&self, req: AppOpenRequest) -> Result<OpenInAppResponse>;
}

/// Gateway of another organisation.
///
/// Calls assume the remote identity carried by `token`; no local credential is
/// forwarded.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn open_in_app(&self, token: &str, req: OpenInAppRequest) -> Result<OpenInAppResponse>;
}
